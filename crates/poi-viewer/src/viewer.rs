//! Headless stand-in for the map widget
//!
//! Starts a reload and renders the viewport every time the store reports a
//! new snapshot, on a single-threaded loop.

use crate::Result;
use geo::Rect;
use poi_index::Marker;
use poi_index::utils::unproject;
use poi_store::{PoiEvent, PoiStore, StoreError};
use serde::Serialize;
use std::io::Write;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::info;

/// What to render
#[derive(Debug, Clone, Copy)]
pub struct View {
    pub viewport: Rect<f64>,
    pub zoom: u8,
    pub json: bool,
}

/// Marker as printed, with its geographic position
#[derive(Serialize)]
struct MarkerRecord<'a> {
    lat: f64,
    lon: f64,
    #[serde(flatten)]
    marker: &'a Marker,
}

/// Reload once and render every published snapshot until the reload settles
pub async fn run(store: PoiStore, mut events: UnboundedReceiver<PoiEvent>, view: View) -> Result<()> {
    let mut reload = store.reload();
    loop {
        tokio::select! {
            biased;
            Some(event) = events.recv() => match event {
                PoiEvent::Updated => render(&store, view).await?,
            },
            finished = &mut reload => {
                finished.map_err(StoreError::from)??;
                // Events sent right before the reload settled
                while let Ok(PoiEvent::Updated) = events.try_recv() {
                    render(&store, view).await?;
                }
                return Ok(());
            }
        }
    }
}

async fn render(store: &PoiStore, view: View) -> Result<()> {
    let snapshot = store.snapshot();
    let markers = store.generalize(view.viewport, view.zoom).await?;
    info!(
        points = snapshot.len(),
        markers = markers.len(),
        zoom = view.zoom,
        "Rendering snapshot"
    );

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    write_markers(&mut out, &markers, view.json)?;
    out.flush()?;
    Ok(())
}

fn write_markers(out: &mut impl Write, markers: &[Marker], json: bool) -> Result<()> {
    let records: Vec<MarkerRecord<'_>> = markers
        .iter()
        .map(|marker| {
            let (lat, lon) = unproject(marker.position);
            MarkerRecord { lat, lon, marker }
        })
        .collect();

    if json {
        serde_json::to_writer_pretty(&mut *out, &records)?;
        writeln!(out)?;
    } else {
        for r in &records {
            let kind = if r.marker.promoted { "promoted" } else { "regular" };
            writeln!(out, "{:>10.5} {:>10.5} {:>8} {kind}", r.lat, r.lon, r.marker.count)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use poi_index::utils::project;

    fn markers() -> Vec<Marker> {
        vec![
            Marker {
                position: project(55.75, 37.62),
                count: 12,
                promoted: true,
            },
            Marker {
                position: project(55.70, 37.50),
                count: 1,
                promoted: false,
            },
        ]
    }

    #[test]
    fn test_text_output() {
        let mut out = Vec::new();
        write_markers(&mut out, &markers(), false).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("55.75000"));
        assert!(lines[0].ends_with("12 promoted"));
        assert!(lines[1].ends_with("1 regular"));
    }

    #[test]
    fn test_json_output() {
        let mut out = Vec::new();
        write_markers(&mut out, &markers(), true).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        let first = &value[0];
        assert_eq!(first["count"], 12);
        assert_eq!(first["promoted"], true);
        assert!((first["lat"].as_f64().unwrap() - 55.75).abs() < 1e-9);
        assert!(first["position"]["x"].is_f64());
    }

    #[test]
    fn test_empty_output() {
        let mut out = Vec::new();
        write_markers(&mut out, &[], false).unwrap();
        assert!(out.is_empty());
    }
}
