//! Per-decode rendering capabilities.
//!
//! A decoded stream draws either as labelled spans (protocol symbols, bus
//! values) or as a stepped logic waveform. Each decode kind implements only
//! the capability it supports; the overlay compositor asks for both and uses
//! whichever exists.

use std::sync::Arc;

use waveform::{Capture, CaptureData};

use crate::types::Rgba;

pub trait TextAnnotations: Send + Sync {
    fn text(&self, index: usize) -> String;
    fn color(&self, index: usize) -> Rgba;
}

pub trait LevelAnnotations: Send + Sync {
    fn level(&self, index: usize) -> bool;
}

pub trait AnnotationRenderer: Send + Sync {
    fn as_text(&self) -> Option<&dyn TextAnnotations> {
        None
    }

    fn as_levels(&self) -> Option<&dyn LevelAnnotations> {
        None
    }
}

/// Symbol table for a protocol capture whose values index into it.
#[derive(Debug, Clone)]
pub struct SymbolTable {
    capture: Arc<Capture>,
    symbols: Vec<(String, Rgba)>,
}

impl SymbolTable {
    pub fn new(capture: Arc<Capture>, symbols: Vec<(String, Rgba)>) -> Self {
        Self { capture, symbols }
    }

    fn symbol(&self, index: usize) -> Option<&(String, Rgba)> {
        match self.capture.data() {
            CaptureData::Protocol(series) if index < series.len() => {
                self.symbols.get(*series.value(index) as usize)
            }
            _ => None,
        }
    }
}

impl TextAnnotations for SymbolTable {
    fn text(&self, index: usize) -> String {
        self.symbol(index)
            .map(|(text, _)| text.clone())
            .unwrap_or_default()
    }

    fn color(&self, index: usize) -> Rgba {
        self.symbol(index)
            .map(|(_, color)| *color)
            .unwrap_or(Rgba::WHITE)
    }
}

impl AnnotationRenderer for SymbolTable {
    fn as_text(&self) -> Option<&dyn TextAnnotations> {
        Some(self)
    }
}

/// Logic levels read straight from a digital capture.
#[derive(Debug, Clone)]
pub struct DigitalLevels {
    capture: Arc<Capture>,
}

impl DigitalLevels {
    pub fn new(capture: Arc<Capture>) -> Self {
        Self { capture }
    }
}

impl LevelAnnotations for DigitalLevels {
    fn level(&self, index: usize) -> bool {
        match self.capture.data() {
            CaptureData::Digital(series) if index < series.len() => *series.value(index),
            _ => false,
        }
    }
}

impl AnnotationRenderer for DigitalLevels {
    fn as_levels(&self) -> Option<&dyn LevelAnnotations> {
        Some(self)
    }
}

/// Parallel bus values drawn as hex spans in a single color.
#[derive(Debug, Clone)]
pub struct BusValues {
    capture: Arc<Capture>,
    color: Rgba,
}

impl BusValues {
    pub fn new(capture: Arc<Capture>, color: Rgba) -> Self {
        Self { capture, color }
    }
}

/// Hex value of `bits`, bit 0 first, zero-padded to the bus width.
pub fn format_bus(bits: &[bool]) -> String {
    let digits = bits.len().div_ceil(4).max(1);
    let nibbles: String = bits
        .chunks(4)
        .rev()
        .map(|nibble| {
            let value = nibble
                .iter()
                .enumerate()
                .fold(0u32, |acc, (bit, &set)| acc | (u32::from(set) << bit));
            char::from_digit(value, 16).unwrap_or('0').to_ascii_uppercase()
        })
        .collect();
    format!("0x{nibbles:0>digits$}")
}

impl TextAnnotations for BusValues {
    fn text(&self, index: usize) -> String {
        match self.capture.data() {
            CaptureData::Bus(series) if index < series.len() => format_bus(series.value(index)),
            _ => String::new(),
        }
    }

    fn color(&self, _index: usize) -> Rgba {
        self.color
    }
}

impl AnnotationRenderer for BusValues {
    fn as_text(&self) -> Option<&dyn TextAnnotations> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waveform::SampleSeries;

    #[test]
    fn symbol_table_resolves_text_and_color() {
        let capture = Arc::new(Capture::new(
            CaptureData::Protocol(SampleSeries::dense(vec![1, 0, 7])),
            1,
            0.0,
        ));
        let table = SymbolTable::new(
            capture,
            vec![
                ("START".into(), Rgba::opaque(0.0, 1.0, 0.0)),
                ("0x41".into(), Rgba::opaque(0.0, 0.5, 1.0)),
            ],
        );
        let renderer: &dyn AnnotationRenderer = &table;
        assert!(renderer.as_levels().is_none());
        let text = renderer.as_text().unwrap();
        assert_eq!(text.text(0), "0x41");
        assert_eq!(text.color(1), Rgba::opaque(0.0, 1.0, 0.0));
        assert_eq!(text.text(2), "");
        assert_eq!(text.color(2), Rgba::WHITE);
    }

    #[test]
    fn digital_levels_only_expose_levels() {
        let capture = Arc::new(Capture::new(
            CaptureData::Digital(SampleSeries::dense(vec![true, false])),
            1,
            0.0,
        ));
        let levels = DigitalLevels::new(capture);
        let renderer: &dyn AnnotationRenderer = &levels;
        assert!(renderer.as_text().is_none());
        let levels = renderer.as_levels().unwrap();
        assert!(levels.level(0));
        assert!(!levels.level(1));
        assert!(!levels.level(5));
    }

    #[test]
    fn bus_values_render_as_hex() {
        assert_eq!(format_bus(&[true, false, false, false, false, false, true, false]), "0x41");
        assert_eq!(format_bus(&[true, true, true, true, true]), "0x1F");
        assert_eq!(format_bus(&[]), "0x0");

        let lanes = [
            SampleSeries::dense(vec![true, false]),
            SampleSeries::dense(vec![false, true]),
        ];
        let bus = SampleSeries::<Vec<bool>>::from_lanes(&[&lanes[0], &lanes[1]]).unwrap();
        let capture = Arc::new(Capture::new(CaptureData::Bus(bus), 1, 0.0));
        let color = Rgba::opaque(0.2, 0.6, 1.0);
        let values = BusValues::new(capture, color);
        let renderer: &dyn AnnotationRenderer = &values;
        assert!(renderer.as_levels().is_none());
        let text = renderer.as_text().unwrap();
        assert_eq!(text.text(0), "0x1");
        assert_eq!(text.text(1), "0x2");
        assert_eq!(text.text(2), "");
        assert_eq!(text.color(0), color);
    }
}
