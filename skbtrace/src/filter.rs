//! # Filter Configuration
//!
//! Translates user filter criteria into the fixed-layout [`FilterConfig`]
//! record and writes it into slot 0 of `CFG_MAP`.
//!
//! All parsing happens in [`build_filter_config`] before anything touches the
//! kernel, so an invalid flag never leaves a half-written configuration
//! behind. The write itself yields an [`AppliedFilter`], the only value the
//! probe attacher accepts: probes cannot be attached before the filter is in
//! place.

use std::borrow::BorrowMut;
use std::net::IpAddr;

use aya::maps::{Array, MapData, MapError};
use log::debug;
use skbtrace_common::{
    FilterConfig, FAMILY_V4, FAMILY_V6, FILTER_MARK, IPPROTO_ICMP, IPPROTO_TCP, IPPROTO_UDP,
    OUTPUT_META, OUTPUT_RELATIVE_TS, OUTPUT_SKB, OUTPUT_TUPLE,
};

use crate::domain::{FilterError, TracerError};

/// Borrowed view of the filter and output flags
#[derive(Debug, Default, Clone, Copy)]
pub struct FilterOptions<'a> {
    pub mark: Option<u32>,
    pub proto: Option<&'a str>,
    pub src_ip: Option<&'a str>,
    pub dst_ip: Option<&'a str>,
    pub src_port: Option<&'a str>,
    pub dst_port: Option<&'a str>,
    pub relative_timestamp: bool,
    pub meta: bool,
    pub tuple: bool,
    pub skb: bool,
}

/// Build the filter record from user criteria
///
/// Unset criteria become wildcards. Ports are stored in network byte order,
/// IPv4 addresses in the first four bytes of the address field.
///
/// # Errors
/// Returns [`FilterError`] for an unknown protocol, an unparsable address or
/// a port outside 0-65535.
pub fn build_filter_config(opts: &FilterOptions<'_>) -> Result<FilterConfig, FilterError> {
    let mut cfg = FilterConfig::wildcard();

    if let Some(mark) = opts.mark {
        cfg.mark = mark;
        cfg.filter_flags |= FILTER_MARK;
    }

    if let Some(proto) = opts.proto {
        cfg.l4_proto = parse_protocol(proto)?;
    }

    if let Some(addr) = opts.src_ip {
        (cfg.src_family, cfg.src_ip) = parse_address("source", addr)?;
    }
    if let Some(addr) = opts.dst_ip {
        (cfg.dst_family, cfg.dst_ip) = parse_address("destination", addr)?;
    }

    if let Some(port) = opts.src_port {
        cfg.src_port = parse_port("source", port)?.to_be();
    }
    if let Some(port) = opts.dst_port {
        cfg.dst_port = parse_port("destination", port)?.to_be();
    }

    for (enabled, flag) in [
        (opts.relative_timestamp, OUTPUT_RELATIVE_TS),
        (opts.meta, OUTPUT_META),
        (opts.tuple, OUTPUT_TUPLE),
        (opts.skb, OUTPUT_SKB),
    ] {
        if enabled {
            cfg.output_flags |= flag;
        }
    }

    Ok(cfg)
}

fn parse_protocol(proto: &str) -> Result<u8, FilterError> {
    match proto.to_ascii_lowercase().as_str() {
        "tcp" => Ok(IPPROTO_TCP),
        "udp" => Ok(IPPROTO_UDP),
        "icmp" => Ok(IPPROTO_ICMP),
        _ => Err(FilterError::InvalidProtocol(proto.to_string())),
    }
}

fn parse_address(field: &'static str, value: &str) -> Result<(u8, [u8; 16]), FilterError> {
    let addr: IpAddr = value
        .trim()
        .parse()
        .map_err(|_| FilterError::InvalidAddress { field, value: value.to_string() })?;

    let mut bytes = [0u8; 16];
    let family = match addr {
        IpAddr::V4(v4) => {
            bytes[..4].copy_from_slice(&v4.octets());
            FAMILY_V4
        }
        IpAddr::V6(v6) => {
            bytes = v6.octets();
            FAMILY_V6
        }
    };
    Ok((family, bytes))
}

fn parse_port(field: &'static str, value: &str) -> Result<u16, FilterError> {
    value.trim().parse().map_err(|_| FilterError::InvalidPort { field, value: value.to_string() })
}

/// Destination of the filter record
pub trait FilterSlot {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Overwrite the whole configuration slot
    ///
    /// # Errors
    /// Returns the backend's error if the slot cannot be written.
    fn write(&mut self, config: &FilterConfig) -> Result<(), Self::Error>;
}

impl<T: BorrowMut<MapData>> FilterSlot for Array<T, FilterConfig> {
    type Error = MapError;

    fn write(&mut self, config: &FilterConfig) -> Result<(), MapError> {
        self.set(0, config, 0)
    }
}

/// Proof that the filter has been written
///
/// Only [`apply_filter`] creates one.
#[derive(Debug)]
pub struct AppliedFilter {
    config: FilterConfig,
}

impl AppliedFilter {
    #[must_use]
    pub fn config(&self) -> &FilterConfig {
        &self.config
    }
}

/// Write the filter record, exactly once per run
///
/// # Errors
/// Returns [`TracerError::FilterWrite`] if the slot rejects the write.
pub fn apply_filter<S: FilterSlot>(
    slot: &mut S,
    config: FilterConfig,
) -> Result<AppliedFilter, TracerError> {
    slot.write(&config).map_err(|e| TracerError::FilterWrite(Box::new(e)))?;
    debug!("Filter configuration written: {config:?}");
    Ok(AppliedFilter { config })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_flags_is_wildcard() {
        let cfg = build_filter_config(&FilterOptions::default()).unwrap();
        assert_eq!(cfg, FilterConfig::wildcard());
        assert_eq!(cfg.filter_flags, 0);
        assert_eq!(cfg.output_flags, 0);
    }

    #[test]
    fn test_protocols() {
        for (name, number) in [("tcp", 6), ("UDP", 17), ("Icmp", 1)] {
            let opts = FilterOptions { proto: Some(name), ..FilterOptions::default() };
            assert_eq!(build_filter_config(&opts).unwrap().l4_proto, number);
        }
    }

    #[test]
    fn test_invalid_protocol() {
        let opts = FilterOptions { proto: Some("sctp"), ..FilterOptions::default() };
        assert_eq!(
            build_filter_config(&opts),
            Err(FilterError::InvalidProtocol("sctp".to_string()))
        );
    }

    #[test]
    fn test_ipv4_address_layout() {
        let opts = FilterOptions { src_ip: Some("10.0.0.1"), ..FilterOptions::default() };
        let cfg = build_filter_config(&opts).unwrap();
        assert_eq!(cfg.src_family, FAMILY_V4);
        assert_eq!(&cfg.src_ip[..4], &[10, 0, 0, 1]);
        assert!(cfg.src_ip[4..].iter().all(|b| *b == 0));
        assert_eq!(cfg.dst_family, 0);
    }

    #[test]
    fn test_ipv6_address_layout() {
        let opts = FilterOptions { dst_ip: Some("fe80::1"), ..FilterOptions::default() };
        let cfg = build_filter_config(&opts).unwrap();
        assert_eq!(cfg.dst_family, FAMILY_V6);
        assert_eq!(cfg.dst_ip[0], 0xfe);
        assert_eq!(cfg.dst_ip[1], 0x80);
        assert_eq!(cfg.dst_ip[15], 1);
    }

    #[test]
    fn test_invalid_address() {
        let opts = FilterOptions { src_ip: Some("10.0.0.256"), ..FilterOptions::default() };
        assert!(matches!(
            build_filter_config(&opts),
            Err(FilterError::InvalidAddress { field: "source", .. })
        ));
    }

    #[test]
    fn test_ports_network_order() {
        let opts = FilterOptions {
            src_port: Some("8080"),
            dst_port: Some("443"),
            ..FilterOptions::default()
        };
        let cfg = build_filter_config(&opts).unwrap();
        assert_eq!(cfg.src_port.to_ne_bytes(), [0x1f, 0x90]);
        assert_eq!(cfg.dst_port.to_ne_bytes(), [0x01, 0xbb]);
    }

    #[test]
    fn test_port_out_of_range() {
        let opts = FilterOptions { dst_port: Some("65536"), ..FilterOptions::default() };
        assert!(matches!(
            build_filter_config(&opts),
            Err(FilterError::InvalidPort { field: "destination", .. })
        ));
    }

    #[test]
    fn test_mark_zero_is_a_filter() {
        let opts = FilterOptions { mark: Some(0), ..FilterOptions::default() };
        let cfg = build_filter_config(&opts).unwrap();
        assert_eq!(cfg.filter_flags & FILTER_MARK, FILTER_MARK);
        assert_eq!(cfg.mark, 0);
    }

    #[test]
    fn test_output_flags() {
        let opts = FilterOptions { meta: true, skb: true, ..FilterOptions::default() };
        let cfg = build_filter_config(&opts).unwrap();
        assert!(cfg.has_output(OUTPUT_META));
        assert!(cfg.has_output(OUTPUT_SKB));
        assert!(!cfg.has_output(OUTPUT_TUPLE));
        assert!(!cfg.has_output(OUTPUT_RELATIVE_TS));
    }
}
