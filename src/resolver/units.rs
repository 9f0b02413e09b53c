//! Parsing of durations, sizes, CPU amounts and port specifications.

use crate::config::{PortEntry, Scalar};
use crate::docker::types::PortConfig;
use crate::error::{ConfigError, Result, StackError};

const NANOS_PER_SECOND: f64 = 1e9;

/// Default port protocol.
const DEFAULT_PROTOCOL: &str = "tcp";

/// Default publish mode.
const DEFAULT_PUBLISH_MODE: &str = "ingress";

fn invalid(kind: &str, value: &str) -> StackError {
    ConfigError::validation(format!("invalid {kind} {value:?}"), kind).into()
}

/// Parses a Go-style duration (`1h30m`, `500ms`, `10s`) into nanoseconds.
///
/// # Errors
///
/// Returns an error for malformed input or unknown units.
#[allow(clippy::cast_possible_truncation)]
pub fn parse_duration(input: &str) -> Result<i64> {
    let text = input.trim();
    if text == "0" {
        return Ok(0);
    }
    if text.is_empty() {
        return Err(invalid("duration", input));
    }

    let mut total = 0.0_f64;
    let mut rest = text;
    while !rest.is_empty() {
        let number_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_end == 0 {
            return Err(invalid("duration", input));
        }
        let value: f64 = rest[..number_end]
            .parse()
            .map_err(|_| invalid("duration", input))?;
        rest = &rest[number_end..];

        let unit_end = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let factor = match &rest[..unit_end] {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => NANOS_PER_SECOND,
            "m" => 60.0 * NANOS_PER_SECOND,
            "h" => 3600.0 * NANOS_PER_SECOND,
            _ => return Err(invalid("duration", input)),
        };
        rest = &rest[unit_end..];
        total += value * factor;
    }

    Ok(total.round() as i64)
}

/// Parses a memory amount (`512M`, `1.5g`, `1024`) into bytes.
///
/// Suffixes are binary multiples and case-insensitive.
///
/// # Errors
///
/// Returns an error for malformed input or unknown suffixes.
#[allow(clippy::cast_possible_truncation)]
pub fn parse_memory(value: &Scalar) -> Result<i64> {
    let text = match value {
        Scalar::Int(bytes) if *bytes >= 0 => return Ok(*bytes),
        Scalar::Str(text) => text.trim().to_ascii_lowercase(),
        other => return Err(invalid("memory", &other.to_string())),
    };

    let number_end = text
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(text.len());
    let amount: f64 = text[..number_end]
        .parse()
        .map_err(|_| invalid("memory", &text))?;
    let multiplier: f64 = match text[number_end..].trim() {
        "" | "b" => 1.0,
        "k" | "kb" | "kib" => 1024.0,
        "m" | "mb" | "mib" => 1024.0 * 1024.0,
        "g" | "gb" | "gib" => 1024.0 * 1024.0 * 1024.0,
        "t" | "tb" | "tib" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        _ => return Err(invalid("memory", &text)),
    };

    Ok((amount * multiplier).round() as i64)
}

/// Parses a fractional CPU amount into nano-CPUs.
///
/// # Errors
///
/// Returns an error for negative or non-numeric input.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub fn parse_nano_cpus(value: &Scalar) -> Result<i64> {
    let cpus = match value {
        Scalar::Int(cpus) => *cpus as f64,
        Scalar::Float(cpus) => *cpus,
        Scalar::Str(text) => text
            .trim()
            .parse::<f64>()
            .map_err(|_| invalid("cpus", text))?,
        Scalar::Bool(_) => return Err(invalid("cpus", &value.to_string())),
    };

    if !cpus.is_finite() || cpus < 0.0 {
        return Err(invalid("cpus", &value.to_string()));
    }
    Ok((cpus * NANOS_PER_SECOND).round() as i64)
}

/// Expands a port entry into published port configurations.
///
/// # Errors
///
/// Returns an error for malformed specifications, mismatched ranges and
/// unknown protocols.
pub fn parse_port(entry: &PortEntry) -> Result<Vec<PortConfig>> {
    match entry {
        PortEntry::Number(target) => Ok(vec![port(DEFAULT_PROTOCOL, *target, None, None)]),
        PortEntry::Long(long) => {
            let protocol = long.protocol.as_deref().unwrap_or(DEFAULT_PROTOCOL);
            check_protocol(protocol)?;
            Ok(vec![port(protocol, long.target, long.published, long.mode.as_deref())])
        }
        PortEntry::Short(spec) => parse_short_port(spec),
    }
}

fn parse_short_port(spec: &str) -> Result<Vec<PortConfig>> {
    let (mapping, protocol) = spec.rsplit_once('/').unwrap_or((spec, DEFAULT_PROTOCOL));
    check_protocol(protocol)?;

    let parts: Vec<&str> = mapping.split(':').collect();
    let (published, target) = match parts.as_slice() {
        [target] => (None, *target),
        [published, target] | [_, published, target] => (Some(*published), *target),
        _ => return Err(invalid("port", spec)),
    };

    let targets = port_range(target).ok_or_else(|| invalid("port", spec))?;
    let published: Vec<Option<u32>> = match published.filter(|p| !p.is_empty()) {
        Some(published) => {
            let published = port_range(published).ok_or_else(|| invalid("port", spec))?;
            if published.len() != targets.len() {
                return Err(invalid("port", spec));
            }
            published.into_iter().map(Some).collect()
        }
        None => vec![None; targets.len()],
    };

    Ok(targets
        .into_iter()
        .zip(published)
        .map(|(target, published)| port(protocol, target, published, None))
        .collect())
}

fn port_range(text: &str) -> Option<Vec<u32>> {
    let (start, end) = match text.split_once('-') {
        Some((start, end)) => (start.parse::<u32>().ok()?, end.parse::<u32>().ok()?),
        None => {
            let port = text.parse::<u32>().ok()?;
            (port, port)
        }
    };
    if start == 0 || end > u32::from(u16::MAX) || start > end {
        return None;
    }
    Some((start..=end).collect())
}

fn check_protocol(protocol: &str) -> Result<()> {
    match protocol {
        "tcp" | "udp" | "sctp" => Ok(()),
        other => Err(invalid("protocol", other)),
    }
}

fn port(protocol: &str, target: u32, published: Option<u32>, mode: Option<&str>) -> PortConfig {
    PortConfig {
        protocol: protocol.to_string(),
        target_port: target,
        published_port: published,
        publish_mode: Some(mode.unwrap_or(DEFAULT_PUBLISH_MODE).to_string()),
    }
}
