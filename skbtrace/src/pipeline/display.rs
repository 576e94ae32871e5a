//! Event rendering
//!
//! One line per event:
//!
//! ```text
//! SKB PROCESS FUNC TIMESTAMP MARK [NETNS IFINDEX PROTO MTU LEN] [TUPLE]
//! ```
//!
//! followed by the raw packet dump when `--output-skb` is set.

use std::borrow::BorrowMut;
use std::fmt::Write as _;
use std::io::{self, Write};
use std::net::{Ipv4Addr, Ipv6Addr};

use aya::maps::{HashMap as BpfHashMap, MapData, MapError};
use log::debug;
use skbtrace_common::{
    FilterConfig, SkbEvent, SkbMeta, SkbTuple, FAMILY_V4, FAMILY_V6, IPPROTO_ICMP, IPPROTO_ICMPV6,
    IPPROTO_TCP, IPPROTO_UDP, OUTPUT_META, OUTPUT_RELATIVE_TS, OUTPUT_SKB, OUTPUT_TUPLE,
    PRINT_SKB_STR_SIZE,
};

use crate::domain::Pid;
use crate::process_lookup::ProcessNames;
use crate::symbolization::AddressTable;

/// Out-of-band raw packet dumps keyed by correlation key
pub trait RawPacketTable {
    /// Fetch and forget the dump for `key`
    fn take(&mut self, key: u64) -> Option<Vec<u8>>;
}

impl<T: BorrowMut<MapData>> RawPacketTable for BpfHashMap<T, u64, [u8; PRINT_SKB_STR_SIZE]> {
    fn take(&mut self, key: u64) -> Option<Vec<u8>> {
        let dump = match self.get(&key, 0) {
            Ok(dump) => dump,
            Err(MapError::KeyNotFound) => return None,
            Err(e) => {
                debug!("Raw packet lookup for {key:#x} failed: {e}");
                return None;
            }
        };
        if let Err(e) = self.remove(&key) {
            debug!("Raw packet removal for {key:#x} failed: {e}");
        }
        Some(dump.to_vec())
    }
}

pub struct EventPrinter<'a> {
    output_flags: u8,
    addresses: &'a AddressTable,
    first_timestamp: Option<u64>,
    raw_packets: Option<Box<dyn RawPacketTable + 'a>>,
    processes: ProcessNames,
    header_printed: bool,
}

impl<'a> EventPrinter<'a> {
    #[must_use]
    pub fn new(config: &FilterConfig, addresses: &'a AddressTable) -> Self {
        Self {
            output_flags: config.output_flags,
            addresses,
            first_timestamp: None,
            raw_packets: None,
            processes: ProcessNames::default(),
            header_printed: false,
        }
    }

    /// Source of raw dumps, consulted only with `OUTPUT_SKB`
    #[must_use]
    pub fn with_raw_packets(mut self, table: impl RawPacketTable + 'a) -> Self {
        self.raw_packets = Some(Box::new(table));
        self
    }

    #[must_use]
    pub fn with_process_names(mut self, processes: ProcessNames) -> Self {
        self.processes = processes;
        self
    }

    fn has(&self, flag: u8) -> bool {
        self.output_flags & flag != 0
    }

    #[must_use]
    pub fn header(&self) -> String {
        let mut line =
            format!("{:>18} {:<24} {:>32} {:>16} {:>10}", "SKB", "PROCESS", "FUNC", "TIMESTAMP", "MARK");
        if self.has(OUTPUT_META) {
            let _ = write!(
                line,
                " {:>10} {:>8} {:>6} {:>6} {:>6}",
                "NETNS", "IFINDEX", "PROTO", "MTU", "LEN"
            );
        }
        if self.has(OUTPUT_TUPLE) {
            line.push_str(" TUPLE");
        }
        line
    }

    /// Timestamp column value; relative to the first rendered event if enabled
    pub fn timestamp(&mut self, timestamp_ns: u64) -> u64 {
        if self.has(OUTPUT_RELATIVE_TS) {
            let first = *self.first_timestamp.get_or_insert(timestamp_ns);
            timestamp_ns.saturating_sub(first)
        } else {
            timestamp_ns
        }
    }

    /// Render the event line without the raw dump
    pub fn render(&mut self, event: &SkbEvent) -> String {
        let timestamp = self.timestamp(event.timestamp_ns);
        let func = self.addresses.symbolize(event.probe_addr);
        let process = self.processes.label(Pid(event.pid));

        let mut line = format!(
            "{:>18} {:<24} {:>32} {:>16} {:>10}",
            format!("{:#018x}", event.skb_addr),
            process,
            func,
            timestamp,
            format!("{:#x}", event.mark),
        );
        if self.has(OUTPUT_META) {
            line.push(' ');
            line.push_str(&format_meta(&event.meta));
        }
        if self.has(OUTPUT_TUPLE) {
            line.push(' ');
            line.push_str(&format_tuple(&event.tuple));
        }
        line
    }

    /// Print the column header; later calls do nothing
    ///
    /// # Errors
    /// Returns the writer's error.
    pub fn print_header<W: Write>(&mut self, out: &mut W) -> io::Result<()> {
        if !self.header_printed {
            writeln!(out, "{}", self.header())?;
            self.header_printed = true;
        }
        Ok(())
    }

    /// Print one event, preceded by the header if it is still pending
    ///
    /// # Errors
    /// Returns the writer's error.
    pub fn print<W: Write>(&mut self, event: &SkbEvent, out: &mut W) -> io::Result<()> {
        self.print_header(out)?;

        let line = self.render(event);
        writeln!(out, "{line}")?;

        if self.has(OUTPUT_SKB) {
            if let Some(dump) =
                self.raw_packets.as_mut().and_then(|t| t.take(event.correlation_key))
            {
                writeln!(out, "{}", format_dump(&dump))?;
            }
        }
        Ok(())
    }
}

#[must_use]
pub fn format_meta(meta: &SkbMeta) -> String {
    format!(
        "{:>10} {:>8} {:>6} {:>6} {:>6}",
        meta.netns,
        meta.ifindex,
        format!("{:#06x}", u16::from_be(meta.protocol)),
        meta.mtu,
        meta.len
    )
}

/// `src:port->dst:port(proto)`, IPv6 addresses bracketed
#[must_use]
pub fn format_tuple(tuple: &SkbTuple) -> String {
    let sport = u16::from_be(tuple.sport);
    let dport = u16::from_be(tuple.dport);
    let (src, dst) = match tuple.family() {
        FAMILY_V4 => (
            format!("{}:{sport}", ipv4(&tuple.saddr)),
            format!("{}:{dport}", ipv4(&tuple.daddr)),
        ),
        FAMILY_V6 => (
            format!("[{}]:{sport}", Ipv6Addr::from(tuple.saddr)),
            format!("[{}]:{dport}", Ipv6Addr::from(tuple.daddr)),
        ),
        _ => (format!("?:{sport}"), format!("?:{dport}")),
    };
    format!("{src}->{dst}({})", protocol_name(tuple.l4_proto))
}

fn ipv4(addr: &[u8; 16]) -> Ipv4Addr {
    Ipv4Addr::new(addr[0], addr[1], addr[2], addr[3])
}

fn protocol_name(proto: u8) -> String {
    match proto {
        IPPROTO_TCP => "tcp".to_string(),
        IPPROTO_UDP => "udp".to_string(),
        IPPROTO_ICMP => "icmp".to_string(),
        IPPROTO_ICMPV6 => "icmp6".to_string(),
        other => other.to_string(),
    }
}

/// The dump is a NUL-terminated string written by the probe
#[must_use]
pub fn format_dump(dump: &[u8]) -> String {
    let end = dump.iter().position(|b| *b == 0).unwrap_or(dump.len());
    String::from_utf8_lossy(&dump[..end]).into_owned()
}
