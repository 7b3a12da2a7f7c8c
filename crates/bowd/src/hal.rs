//! Boot-control HAL seam.
//!
//! A/B-slot information comes from a vendor service that may be absent at
//! runtime. Call sites hold an `Option<Arc<dyn BootControl>>` and treat
//! both a missing capability and a `None` answer as "no information".

/// Slot state queries consumed by the checkpoint lifecycle.
pub trait BootControl: Send + Sync {
    /// Suffix of the currently booted slot (e.g. `"_a"`), if known.
    fn current_slot_suffix(&self) -> Option<String>;

    /// Whether the current slot has been marked successful. `None` when
    /// the HAL cannot answer.
    fn is_current_slot_successful(&self) -> Option<bool>;
}
