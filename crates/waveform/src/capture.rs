use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    #[error("sparse capture has {offsets} offsets, {durations} durations and {values} values")]
    LengthMismatch {
        offsets: usize,
        durations: usize,
        values: usize,
    },
    #[error("sample {index} starts before the previous sample")]
    Unordered { index: usize },
    #[error("sample {index} has a negative duration")]
    NegativeDuration { index: usize },
    #[error("density field {width}x{height} needs {expected} values, got {actual}")]
    FieldSize {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
    #[error("a bus needs at least one lane")]
    NoLanes,
    #[error("bus lane {lane} does not share the timing of lane 0")]
    LaneTiming { lane: usize },
}

/// Sample placement in time, in offset units of the owning capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Timing {
    /// Implicit `offset = index`, `duration = 1`.
    Dense,
    Sparse {
        offsets: Vec<i64>,
        durations: Vec<i64>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SampleSeries<T> {
    timing: Timing,
    values: Vec<T>,
}

impl<T> SampleSeries<T> {
    pub fn dense(values: Vec<T>) -> Self {
        Self {
            timing: Timing::Dense,
            values,
        }
    }

    pub fn sparse(
        offsets: Vec<i64>,
        durations: Vec<i64>,
        values: Vec<T>,
    ) -> Result<Self, CaptureError> {
        if offsets.len() != values.len() || durations.len() != values.len() {
            return Err(CaptureError::LengthMismatch {
                offsets: offsets.len(),
                durations: durations.len(),
                values: values.len(),
            });
        }
        if let Some(index) = offsets.windows(2).position(|pair| pair[1] < pair[0]) {
            return Err(CaptureError::Unordered { index: index + 1 });
        }
        if let Some(index) = durations.iter().position(|&d| d < 0) {
            return Err(CaptureError::NegativeDuration { index });
        }
        Ok(Self {
            timing: Timing::Sparse { offsets, durations },
            values,
        })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_dense(&self) -> bool {
        matches!(self.timing, Timing::Dense)
    }

    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    /// Start of sample `index`. Panics if `index` is out of range.
    pub fn offset(&self, index: usize) -> i64 {
        match &self.timing {
            Timing::Dense => index as i64,
            Timing::Sparse { offsets, .. } => offsets[index],
        }
    }

    pub fn duration(&self, index: usize) -> i64 {
        match &self.timing {
            Timing::Dense => 1,
            Timing::Sparse { durations, .. } => durations[index],
        }
    }

    pub fn value(&self, index: usize) -> &T {
        &self.values[index]
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }
}

impl SampleSeries<Vec<bool>> {
    /// Combines digital lanes sampled on the same timing into one bus series.
    /// Bit `n` of every sample comes from `lanes[n]`.
    pub fn from_lanes(lanes: &[&SampleSeries<bool>]) -> Result<Self, CaptureError> {
        let (first, rest) = lanes.split_first().ok_or(CaptureError::NoLanes)?;
        if let Some(lane) = rest
            .iter()
            .position(|lane| lane.timing != first.timing || lane.len() != first.len())
        {
            return Err(CaptureError::LaneTiming { lane: lane + 1 });
        }
        let values = (0..first.len())
            .map(|index| lanes.iter().map(|lane| lane.values[index]).collect())
            .collect();
        Ok(Self {
            timing: first.timing.clone(),
            values,
        })
    }
}

/// Row-major `width * height` intensity grid, row 0 at the bottom.
#[derive(Debug, Clone, PartialEq)]
pub struct DensityField {
    width: u32,
    height: u32,
    data: Vec<f32>,
}

impl DensityField {
    pub fn new(width: u32, height: u32, data: Vec<f32>) -> Result<Self, CaptureError> {
        let expected = width as usize * height as usize;
        if data.len() != expected {
            return Err(CaptureError::FieldSize {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Largest finite value in the field, or zero for an all-empty field.
    pub fn peak(&self) -> f32 {
        self.data
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(0.0, f32::max)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CaptureData {
    Analog(SampleSeries<f32>),
    Digital(SampleSeries<bool>),
    Bus(SampleSeries<Vec<bool>>),
    /// Decoded protocol symbols; each value indexes the decoder's symbol table.
    Protocol(SampleSeries<u32>),
    Eye(DensityField),
    Waterfall(DensityField),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureKind {
    Analog,
    Digital,
    Bus,
    Protocol,
    Eye,
    Waterfall,
}

impl fmt::Display for CaptureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CaptureKind::Analog => "analog",
            CaptureKind::Digital => "digital",
            CaptureKind::Bus => "bus",
            CaptureKind::Protocol => "protocol",
            CaptureKind::Eye => "eye",
            CaptureKind::Waterfall => "waterfall",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Capture {
    timescale: i64,
    trigger_phase: f64,
    generation: u64,
    data: CaptureData,
}

impl Capture {
    /// `timescale` is the duration of one offset unit; `trigger_phase` shifts
    /// every sample by the same sub-unit amount.
    pub fn new(data: CaptureData, timescale: i64, trigger_phase: f64) -> Self {
        Self {
            timescale,
            trigger_phase,
            generation: NEXT_GENERATION.fetch_add(1, Ordering::Relaxed),
            data,
        }
    }

    pub fn timescale(&self) -> i64 {
        self.timescale
    }

    pub fn trigger_phase(&self) -> f64 {
        self.trigger_phase
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn data(&self) -> &CaptureData {
        &self.data
    }

    pub fn kind(&self) -> CaptureKind {
        match self.data {
            CaptureData::Analog(_) => CaptureKind::Analog,
            CaptureData::Digital(_) => CaptureKind::Digital,
            CaptureData::Bus(_) => CaptureKind::Bus,
            CaptureData::Protocol(_) => CaptureKind::Protocol,
            CaptureData::Eye(_) => CaptureKind::Eye,
            CaptureData::Waterfall(_) => CaptureKind::Waterfall,
        }
    }

    /// Number of time-domain samples; density fields report zero.
    pub fn sample_count(&self) -> usize {
        match &self.data {
            CaptureData::Analog(series) => series.len(),
            CaptureData::Digital(series) => series.len(),
            CaptureData::Bus(series) => series.len(),
            CaptureData::Protocol(series) => series.len(),
            CaptureData::Eye(_) | CaptureData::Waterfall(_) => 0,
        }
    }

    pub fn is_dense(&self) -> bool {
        match &self.data {
            CaptureData::Analog(series) => series.is_dense(),
            CaptureData::Digital(series) => series.is_dense(),
            CaptureData::Bus(series) => series.is_dense(),
            CaptureData::Protocol(series) => series.is_dense(),
            CaptureData::Eye(_) | CaptureData::Waterfall(_) => true,
        }
    }

    /// Start offset and duration of sample `index`, for any time-domain kind.
    pub fn span(&self, index: usize) -> Option<(i64, i64)> {
        if index >= self.sample_count() {
            return None;
        }
        let span = match &self.data {
            CaptureData::Analog(s) => (s.offset(index), s.duration(index)),
            CaptureData::Digital(s) => (s.offset(index), s.duration(index)),
            CaptureData::Bus(s) => (s.offset(index), s.duration(index)),
            CaptureData::Protocol(s) => (s.offset(index), s.duration(index)),
            CaptureData::Eye(_) | CaptureData::Waterfall(_) => return None,
        };
        Some(span)
    }
}
