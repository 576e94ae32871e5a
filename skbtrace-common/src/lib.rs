//! # Shared Data Structures (eBPF ↔ Userspace)
//!
//! Defines the binary layout agreed between the kernel-side probe object and
//! userspace. All types use `#[repr(C)]` so both sides see the same bytes.
//!
//! ## Kernel Boundary
//!
//! - `CFG_MAP` - single-slot array holding a [`FilterConfig`]
//! - `EVENTS` - perf event array carrying [`SkbEvent`] records
//! - `PRINT_SKB_MAP` - hash of correlation key → raw packet dump
//! - `SKBTRACE_LAYOUT_VERSION` - `u32` global exported by the object
//!
//! Any change to a struct in this file must bump [`LAYOUT_VERSION`].

#![no_std]

// ============================================================================
// Layout Agreement
// ============================================================================

/// Version of the binary layout shared with the probe object.
///
/// The probe object exports the same number in its
/// [`LAYOUT_VERSION_SYMBOL`] global; the loader refuses to continue on a
/// mismatch. Size equality alone cannot catch reordered same-size fields.
pub const LAYOUT_VERSION: u32 = 1;

/// Name of the `u32` global carrying the object's layout version
pub const LAYOUT_VERSION_SYMBOL: &str = "SKBTRACE_LAYOUT_VERSION";

/// Single-slot filter configuration array
pub const CFG_MAP: &str = "CFG_MAP";

/// Perf event array carrying [`SkbEvent`]
pub const EVENTS_MAP: &str = "EVENTS";

/// Correlation key → raw packet dump, populated only with `OUTPUT_SKB`
pub const PRINT_SKB_MAP: &str = "PRINT_SKB_MAP";

/// Probe program names, indexed by argument position minus one.
///
/// Each variant reads the `struct sk_buff *` from one fixed argument register.
pub const PROBE_PROGRAMS: [&str; 5] = [
    "kprobe_skb_1",
    "kprobe_skb_2",
    "kprobe_skb_3",
    "kprobe_skb_4",
    "kprobe_skb_5",
];

/// Size of one raw packet dump value in `PRINT_SKB_MAP`
pub const PRINT_SKB_STR_SIZE: usize = 2048;

// ============================================================================
// Flag Bits
// ============================================================================

/// `FilterConfig::filter_flags`: the mark filter is set
pub const FILTER_MARK: u8 = 1 << 0;

/// `FilterConfig::output_flags`: print timestamps relative to the first event
pub const OUTPUT_RELATIVE_TS: u8 = 1 << 0;
/// `FilterConfig::output_flags`: capture and print skb metadata
pub const OUTPUT_META: u8 = 1 << 1;
/// `FilterConfig::output_flags`: capture and print the L3/L4 tuple
pub const OUTPUT_TUPLE: u8 = 1 << 2;
/// `FilterConfig::output_flags`: capture the raw skb into `PRINT_SKB_MAP`
pub const OUTPUT_SKB: u8 = 1 << 3;

/// Address family tag: match any family
pub const FAMILY_ANY: u8 = 0;
/// Address family tag: IPv4, address in the first four bytes
pub const FAMILY_V4: u8 = 4;
/// Address family tag: IPv6, all sixteen bytes
pub const FAMILY_V6: u8 = 6;

pub const IPPROTO_ICMP: u8 = 1;
pub const IPPROTO_TCP: u8 = 6;
pub const IPPROTO_UDP: u8 = 17;
pub const IPPROTO_ICMPV6: u8 = 58;

pub const ETH_P_IP: u16 = 0x0800;
pub const ETH_P_IPV6: u16 = 0x86DD;

// ============================================================================
// Shared Data Structures
// ============================================================================

/// Filter configuration, written once by userspace into slot 0 of `CFG_MAP`
/// before any probe is attached, and consulted on every probe hit.
///
/// Every field at its zero value means "match anything".
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FilterConfig {
    /// Always [`LAYOUT_VERSION`]
    pub version: u32,

    /// Packet mark to match, only meaningful with [`FILTER_MARK`]
    pub mark: u32,

    /// Source address, v4 in the first four bytes
    pub src_ip: [u8; 16],

    /// Destination address, v4 in the first four bytes
    pub dst_ip: [u8; 16],

    /// Source port in network byte order, 0 = any
    pub src_port: u16,

    /// Destination port in network byte order, 0 = any
    pub dst_port: u16,

    /// [`FAMILY_ANY`], [`FAMILY_V4`] or [`FAMILY_V6`]
    pub src_family: u8,

    /// [`FAMILY_ANY`], [`FAMILY_V4`] or [`FAMILY_V6`]
    pub dst_family: u8,

    /// IP protocol number, 0 = any
    pub l4_proto: u8,

    /// `FILTER_*` bits
    pub filter_flags: u8,

    /// `OUTPUT_*` bits
    pub output_flags: u8,

    #[allow(clippy::pub_underscore_fields)]
    pub _padding: [u8; 3],
}

impl FilterConfig {
    pub const SIZE: usize = core::mem::size_of::<Self>();

    /// A configuration that matches every packet and enables no extra output
    #[must_use]
    pub fn wildcard() -> Self {
        Self { version: LAYOUT_VERSION, ..Self::default() }
    }

    #[must_use]
    pub fn has_output(&self, flag: u8) -> bool {
        self.output_flags & flag != 0
    }

    /// Reference matcher, identical in semantics to the kernel-side check.
    ///
    /// Unset criteria never reject. A family-tagged address only matches a
    /// tuple of the same family, so an IPv4 filter never matches the leading
    /// bytes of an IPv6 address.
    #[must_use]
    pub fn matches(&self, mark: u32, tuple: &SkbTuple) -> bool {
        if self.filter_flags & FILTER_MARK != 0 && self.mark != mark {
            return false;
        }
        if self.l4_proto != 0 && self.l4_proto != tuple.l4_proto {
            return false;
        }
        if !addr_matches(self.src_family, &self.src_ip, tuple.family(), &tuple.saddr) {
            return false;
        }
        if !addr_matches(self.dst_family, &self.dst_ip, tuple.family(), &tuple.daddr) {
            return false;
        }
        if self.src_port != 0 && self.src_port != tuple.sport {
            return false;
        }
        if self.dst_port != 0 && self.dst_port != tuple.dport {
            return false;
        }
        true
    }
}

fn addr_matches(family: u8, want: &[u8; 16], got_family: u8, got: &[u8; 16]) -> bool {
    match family {
        FAMILY_ANY => true,
        FAMILY_V4 => got_family == FAMILY_V4 && want[..4] == got[..4],
        FAMILY_V6 => got_family == FAMILY_V6 && want == got,
        _ => false,
    }
}

/// Packet metadata, filled only with [`OUTPUT_META`]
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SkbMeta {
    /// Network namespace inode number
    pub netns: u32,
    pub ifindex: u32,
    /// `skb->len`
    pub len: u32,
    /// MTU of the device the skb is attached to
    pub mtu: u32,
    /// `skb->protocol`, network byte order
    pub protocol: u16,
    #[allow(clippy::pub_underscore_fields)]
    pub _pad: u16,
}

/// Flow tuple, filled only with [`OUTPUT_TUPLE`] or when an address/port
/// filter is active
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SkbTuple {
    pub saddr: [u8; 16],
    pub daddr: [u8; 16],
    /// Network byte order
    pub sport: u16,
    /// Network byte order
    pub dport: u16,
    /// EtherType in host byte order ([`ETH_P_IP`] / [`ETH_P_IPV6`])
    pub l3_proto: u16,
    pub l4_proto: u8,
    #[allow(clippy::pub_underscore_fields)]
    pub _pad: u8,
}

impl SkbTuple {
    /// Address family tag derived from the EtherType
    #[must_use]
    pub fn family(&self) -> u8 {
        match self.l3_proto {
            ETH_P_IP => FAMILY_V4,
            ETH_P_IPV6 => FAMILY_V6,
            _ => FAMILY_ANY,
        }
    }
}

/// Event emitted on every probe hit that passes the filter
///
/// **Size**: 104 bytes. Perf samples may carry trailing padding; userspace
/// accepts any record at least [`SkbEvent::SIZE`] long.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SkbEvent {
    /// TGID of the current task when the probe fired
    pub pid: u32,

    /// `skb->mark`
    pub mark: u32,

    /// `bpf_ktime_get_ns()`
    pub timestamp_ns: u64,

    /// Instruction pointer at probe entry, symbolized via kallsyms
    pub probe_addr: u64,

    /// Address of the `struct sk_buff`, opaque to userspace
    pub skb_addr: u64,

    /// Key into `PRINT_SKB_MAP`, opaque to userspace
    pub correlation_key: u64,

    pub meta: SkbMeta,

    pub tuple: SkbTuple,

    #[allow(clippy::pub_underscore_fields)]
    pub _padding: [u8; 4],
}

impl SkbEvent {
    pub const SIZE: usize = core::mem::size_of::<Self>();
}

#[cfg(feature = "user")]
use aya::Pod;

// Required for eBPF <-> userspace map access
#[cfg(feature = "user")]
#[allow(unsafe_code)]
unsafe impl Pod for FilterConfig {}

#[cfg(feature = "user")]
#[allow(unsafe_code)]
unsafe impl Pod for SkbEvent {}
