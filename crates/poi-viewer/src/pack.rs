//! Conversion of plain-text point lists into cache files

use crate::{Result, ViewerError};
use poi_index::utils::{is_valid_latitude, point_from_degrees};
use poi_index::{Point, PointSet};
use poi_store::CacheFile;
use std::path::Path;

/// Read `input` and write the packed point set to `output`
pub fn run(input: &Path, output: &Path) -> Result<PointSet> {
    let text = std::fs::read_to_string(input)?;
    let (promoted, regular) = parse_points(&text)?;
    let set = PointSet::from_points(promoted, regular);

    let bytes = set.to_bytes();
    CacheFile::new(output).store(&bytes)?;
    tracing::info!(
        promoted = set.promoted().len(),
        regular = set.regular().len(),
        bytes = bytes.len(),
        output = %output.display(),
        "Packed point set"
    );
    Ok(set)
}

/// Parse `lat,lon[,promoted]` lines; blank lines and `#` comments are skipped
pub fn parse_points(text: &str) -> Result<(Vec<Point>, Vec<Point>)> {
    let mut promoted = Vec::new();
    let mut regular = Vec::new();

    for (index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let parse_error = |message: String| ViewerError::Parse {
            line: index + 1,
            message,
        };

        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        let (lat, lon, is_promoted) = match fields.as_slice() {
            [lat, lon] => (*lat, *lon, false),
            [lat, lon, flag] => (*lat, *lon, parse_flag(flag).map_err(&parse_error)?),
            _ => return Err(parse_error(format!("expected 2 or 3 fields, got {}", fields.len()))),
        };
        let lat: f64 = lat
            .parse()
            .map_err(|e| parse_error(format!("invalid latitude '{lat}': {e}")))?;
        let lon: f64 = lon
            .parse()
            .map_err(|e| parse_error(format!("invalid longitude '{lon}': {e}")))?;
        if !is_valid_latitude(lat) || !(-180.0..=180.0).contains(&lon) {
            return Err(parse_error(format!("coordinate {lat},{lon} is outside the map")));
        }

        let point = point_from_degrees(lat, lon);
        if is_promoted {
            promoted.push(point);
        } else {
            regular.push(point);
        }
    }
    Ok((promoted, regular))
}

fn parse_flag(flag: &str) -> std::result::Result<bool, String> {
    match flag {
        "1" | "true" | "promoted" => Ok(true),
        "0" | "false" | "" => Ok(false),
        other => Err(format!("invalid promoted flag '{other}'")),
    }
}
