//! Generic register abstraction shared by the MSR and MMIO copies

/// Trait for register layouts that convert to/from a raw 64-bit value
///
/// The package power limit register exists twice (an MSR copy and a
/// memory-mapped copy) with an identical layout; implementors of this trait
/// describe the layout once and leave the access path to the caller.
///
/// Note that `from_raw_value` followed by `to_raw_value` drops reserved
/// bits. Read-modify-write sequences that must preserve reserved bits should
/// operate on the raw value with the field masks in [`crate::rapl::mask`]
/// instead of round-tripping through the layout.
pub trait RegisterLayout: Sized {
    /// Encode this layout into a raw register value
    fn to_raw_value(&self) -> u64;

    /// Parse a raw register value into this layout
    fn from_raw_value(value: u64) -> Self;

    /// Validate that the field values fit their bit widths
    ///
    /// Returns `Ok(())` if valid, or an error message if invalid.
    fn validate(&self) -> Result<(), &'static str> {
        Ok(())
    }
}
