use crate::scene::ChannelId;

pub const MAX_OVERLAY_SLOTS: usize = 10;

/// Vertical bands reserved for decode rows. A decode keeps its band from the
/// frame it first appears until it is removed.
#[derive(Debug, Default, Clone)]
pub struct OverlaySlots {
    slots: [Option<ChannelId>; MAX_OVERLAY_SLOTS],
}

impl OverlaySlots {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slot_of(&self, id: ChannelId) -> Option<usize> {
        self.slots.iter().position(|slot| *slot == Some(id))
    }

    /// Returns the band held by `id`, taking the lowest free one if it has
    /// none yet. `None` once every band is taken.
    pub fn assign(&mut self, id: ChannelId) -> Option<usize> {
        if let Some(slot) = self.slot_of(id) {
            return Some(slot);
        }
        let free = self.slots.iter().position(Option::is_none)?;
        self.slots[free] = Some(id);
        Some(free)
    }

    /// Releases bands whose decode no longer passes `keep`.
    pub fn retain(&mut self, mut keep: impl FnMut(ChannelId) -> bool) {
        for slot in &mut self.slots {
            if matches!(slot, Some(id) if !keep(*id)) {
                *slot = None;
            }
        }
    }

    pub fn occupied(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reuses_lowest_free_slot() {
        let (a, b, c) = (ChannelId(1), ChannelId(2), ChannelId(3));
        let mut slots = OverlaySlots::new();
        assert_eq!(slots.assign(a), Some(0));
        assert_eq!(slots.assign(b), Some(1));
        slots.retain(|id| id != a);
        assert_eq!(slots.assign(c), Some(0));
        assert_eq!(slots.slot_of(b), Some(1));
    }

    #[test]
    fn assignment_is_stable() {
        let mut slots = OverlaySlots::new();
        slots.assign(ChannelId(7));
        slots.assign(ChannelId(8));
        assert_eq!(slots.assign(ChannelId(7)), Some(0));
        assert_eq!(slots.assign(ChannelId(8)), Some(1));
        assert_eq!(slots.occupied(), 2);
    }

    #[test]
    fn runs_out_after_ten() {
        let mut slots = OverlaySlots::new();
        for n in 0..MAX_OVERLAY_SLOTS as u32 {
            assert_eq!(slots.assign(ChannelId(n)), Some(n as usize));
        }
        assert_eq!(slots.assign(ChannelId(99)), None);
    }
}
