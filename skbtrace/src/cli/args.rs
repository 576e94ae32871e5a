//! CLI argument definitions

use clap::Parser;
use std::path::PathBuf;

use crate::catalog::DEFAULT_BTF_PATH;
use crate::filter::FilterOptions;

#[derive(Parser, Debug)]
#[command(
    name = "skbtrace",
    version,
    about = "Trace the kernel functions a packet passes through",
    after_help = "\
EXAMPLES:
    sudo skbtrace --filter-proto tcp --filter-dst-port 443
    sudo skbtrace --filter-src-ip 10.0.0.1 --output-tuple --output-meta
    sudo skbtrace --filter-mark 0x0 --output-skb --bpf-object ./skbtrace.bpf.o"
)]
pub struct Args {
    /// Only packets with this skb mark
    #[arg(long, value_name = "MARK", value_parser = parse_mark)]
    pub filter_mark: Option<u32>,

    /// Only this L4 protocol: tcp, udp or icmp
    #[arg(long, value_name = "PROTO")]
    pub filter_proto: Option<String>,

    /// Only packets from this IPv4 or IPv6 address
    #[arg(long, value_name = "ADDR")]
    pub filter_src_ip: Option<String>,

    /// Only packets to this IPv4 or IPv6 address
    #[arg(long, value_name = "ADDR")]
    pub filter_dst_ip: Option<String>,

    /// Only packets from this port
    #[arg(long, value_name = "PORT")]
    pub filter_src_port: Option<String>,

    /// Only packets to this port
    #[arg(long, value_name = "PORT")]
    pub filter_dst_port: Option<String>,

    /// Show timestamps relative to the first event
    #[arg(long)]
    pub output_relative_timestamp: bool,

    /// Show netns, ifindex, protocol, MTU and length
    #[arg(long)]
    pub output_meta: bool,

    /// Show the L3/L4 tuple
    #[arg(long)]
    pub output_tuple: bool,

    /// Dump the sk_buff after each event
    #[arg(long)]
    pub output_skb: bool,

    /// Load the kernel probe object from this file instead of the embedded one
    #[arg(long, value_name = "PATH")]
    pub bpf_object: Option<PathBuf>,

    /// Kernel BTF file used to discover traceable functions
    #[arg(long, value_name = "PATH", default_value = DEFAULT_BTF_PATH)]
    pub btf: PathBuf,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    #[must_use]
    pub fn filter_options(&self) -> FilterOptions<'_> {
        FilterOptions {
            mark: self.filter_mark,
            proto: self.filter_proto.as_deref(),
            src_ip: self.filter_src_ip.as_deref(),
            dst_ip: self.filter_dst_ip.as_deref(),
            src_port: self.filter_src_port.as_deref(),
            dst_port: self.filter_dst_port.as_deref(),
            relative_timestamp: self.output_relative_timestamp,
            meta: self.output_meta,
            tuple: self.output_tuple,
            skb: self.output_skb,
        }
    }
}

/// Marks are usually written in hex
fn parse_mark(value: &str) -> Result<u32, String> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed.map_err(|e| format!("invalid mark '{value}': {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["skbtrace"]).unwrap();
        assert_eq!(args.btf, PathBuf::from("/sys/kernel/btf/vmlinux"));
        assert!(args.filter_mark.is_none());
        assert!(!args.output_skb);
        assert!(args.bpf_object.is_none());
    }

    #[test]
    fn test_filter_flags() {
        let args = Args::try_parse_from([
            "skbtrace",
            "--filter-mark",
            "0x10",
            "--filter-proto",
            "udp",
            "--filter-dst-port",
            "53",
            "--output-tuple",
        ])
        .unwrap();
        let opts = args.filter_options();
        assert_eq!(opts.mark, Some(16));
        assert_eq!(opts.proto, Some("udp"));
        assert_eq!(opts.dst_port, Some("53"));
        assert!(opts.tuple);
        assert!(!opts.meta);
    }

    #[test]
    fn test_parse_mark() {
        assert_eq!(parse_mark("42"), Ok(42));
        assert_eq!(parse_mark("0xff"), Ok(255));
        assert!(parse_mark("-1").is_err());
    }
}
