//! Domain types providing compile-time safety and self-documentation
//!
//! These newtype wrappers keep argument positions, CPU ids and process ids
//! from being mixed up, and make function signatures more expressive.

use std::fmt;

use skbtrace_common::PROBE_PROGRAMS;

/// 1-based ordinal of the first `struct sk_buff *` parameter of a function
///
/// Any value is representable; only 1..=5 has a matching probe variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArgPosition(pub u32);

impl fmt::Display for ArgPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "arg{}", self.0)
    }
}

/// One of the five kernel-resident probe programs
///
/// Each variant reads the packet pointer from a fixed argument register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeVariant {
    Arg1,
    Arg2,
    Arg3,
    Arg4,
    Arg5,
}

impl ProbeVariant {
    pub const ALL: [ProbeVariant; 5] = [
        ProbeVariant::Arg1,
        ProbeVariant::Arg2,
        ProbeVariant::Arg3,
        ProbeVariant::Arg4,
        ProbeVariant::Arg5,
    ];

    /// Select the variant for an argument position, `None` when unsupported
    #[must_use]
    pub fn for_position(position: ArgPosition) -> Option<Self> {
        match position.0 {
            1 => Some(ProbeVariant::Arg1),
            2 => Some(ProbeVariant::Arg2),
            3 => Some(ProbeVariant::Arg3),
            4 => Some(ProbeVariant::Arg4),
            5 => Some(ProbeVariant::Arg5),
            _ => None,
        }
    }

    #[must_use]
    pub fn position(self) -> ArgPosition {
        match self {
            ProbeVariant::Arg1 => ArgPosition(1),
            ProbeVariant::Arg2 => ArgPosition(2),
            ProbeVariant::Arg3 => ArgPosition(3),
            ProbeVariant::Arg4 => ArgPosition(4),
            ProbeVariant::Arg5 => ArgPosition(5),
        }
    }

    /// Name of the program inside the probe object
    #[must_use]
    pub fn program_name(self) -> &'static str {
        PROBE_PROGRAMS[self.index()]
    }

    fn index(self) -> usize {
        match self {
            ProbeVariant::Arg1 => 0,
            ProbeVariant::Arg2 => 1,
            ProbeVariant::Arg3 => 2,
            ProbeVariant::Arg4 => 3,
            ProbeVariant::Arg5 => 4,
        }
    }
}

impl fmt::Display for ProbeVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.program_name())
    }
}

/// A kernel function that receives a packet buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionEntry {
    pub name: String,
    pub position: ArgPosition,
}

impl FunctionEntry {
    pub fn new(name: impl Into<String>, position: ArgPosition) -> Self {
        Self { name: name.into(), position }
    }

    #[must_use]
    pub fn variant(&self) -> Option<ProbeVariant> {
        ProbeVariant::for_position(self.position)
    }
}

/// CPU ID
///
/// Represents a CPU core ID (0, 1, 2, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CpuId(pub u32);

impl fmt::Display for CpuId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CPU:{}", self.0)
    }
}

/// Process ID (TGID) reported by the probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pid(pub u32);

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PID:{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_for_supported_positions() {
        for (i, variant) in ProbeVariant::ALL.iter().enumerate() {
            let position = ArgPosition(i as u32 + 1);
            assert_eq!(ProbeVariant::for_position(position), Some(*variant));
            assert_eq!(variant.position(), position);
        }
    }

    #[test]
    fn test_variant_for_unsupported_positions() {
        assert_eq!(ProbeVariant::for_position(ArgPosition(0)), None);
        assert_eq!(ProbeVariant::for_position(ArgPosition(6)), None);
        assert_eq!(ProbeVariant::for_position(ArgPosition(u32::MAX)), None);
    }

    #[test]
    fn test_program_names() {
        assert_eq!(ProbeVariant::Arg1.program_name(), "kprobe_skb_1");
        assert_eq!(ProbeVariant::Arg5.program_name(), "kprobe_skb_5");
        assert_eq!(ProbeVariant::Arg3.to_string(), "kprobe_skb_3");
    }

    #[test]
    fn test_display() {
        assert_eq!(ArgPosition(2).to_string(), "arg2");
        assert_eq!(CpuId(3).to_string(), "CPU:3");
        assert_eq!(Pid(42).to_string(), "PID:42");
    }
}
