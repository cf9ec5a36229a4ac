//! Grouped register flags

use bitflags::bitflags;

bitflags! {
    /// Flags controlling how a grouped register is laid out and rendered
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RegisterFlags: u8 {
        /// Logical chunk `i` is stored in physical sub-register `N-1-i`
        const REVERSE_SUBREGS_ORDER = 1 << 0;
        /// Render sub-registers as fixed-width hex strings instead of bytes
        const CONFIG_AS_HEXSTRING   = 1 << 1;
        /// Reverse the bytes within each sub-register
        const BYTE_SWAP             = 1 << 2;
    }
}

impl Default for RegisterFlags {
    fn default() -> Self {
        RegisterFlags::empty()
    }
}
