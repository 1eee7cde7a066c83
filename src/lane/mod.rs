//! Lane layer: per-lane alignment, ILAS capture and inter-lane deskew.
//!
//! - [`LaneReceiver`]: frame/multiframe phase, framing error monitor, character replacement
//! - [`IlasDetector`] / [`IlasRecord`]: ILAS capture and configuration decoding
//! - [`DeskewBuffer`]: per-lane FIFOs released in lockstep
//! - [`Lane`]: one logical lane, receiver and detector together

mod deskew;
mod ilas;
mod receiver;

pub use deskew::*;
pub use ilas::*;
pub use receiver::*;

use crate::config::JesdSettings;

/// One logical lane of the link.
#[derive(Debug, Clone)]
pub struct Lane {
    index: usize,
    enabled: bool,
    synced: bool,
    receiver: LaneReceiver,
    ilas: IlasDetector,
}

impl Lane {
    /// Logical lane `index` of a link with `settings`.
    pub fn new(index: usize, settings: &JesdSettings) -> Self {
        let f = usize::from(settings.f);
        let k = usize::from(settings.k);
        Self {
            index,
            enabled: false,
            synced: false,
            receiver: LaneReceiver::new(index, f, k, settings.scr),
            ilas: IlasDetector::new(index, settings.multiframe_octets()),
        }
    }

    /// Logical lane index.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Enable or disable the lane. Disabling discards all lane state.
    pub fn set_enabled(&mut self, enabled: bool) {
        if !enabled {
            self.reset();
        }
        self.enabled = enabled;
    }

    /// Whether the lane is enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Discard alignment and the captured ILAS.
    pub fn reset(&mut self) {
        self.synced = false;
        self.receiver.reset();
        self.ilas.reset();
    }

    /// Code group sync as seen by the link: PHY sync without a framing error.
    pub fn code_sync(&self) -> bool {
        self.enabled && self.synced
    }

    /// Alignment state.
    pub fn receiver(&self) -> &LaneReceiver {
        &self.receiver
    }

    /// ILAS capture state.
    pub fn ilas(&self) -> &IlasDetector {
        &self.ilas
    }

    /// Process one tick of PHY output.
    ///
    /// Returns the lane's data-phase octets, which go to the deskew buffer.
    pub fn tick(&mut self, input: &LaneInput) -> Option<LaneOctet> {
        if !self.enabled {
            self.synced = false;
            return None;
        }
        let out = self.receiver.tick(input);
        self.synced = input.code_sync && !self.receiver.framing_error();
        let out = out?;

        if self.receiver.in_data_phase() {
            return Some(out);
        }
        if self.ilas.push(&out) {
            self.receiver.enter_data_phase();
        }
        None
    }
}
