//! Background raster tile fetching.
//!
//! A small pool of worker threads downloads and decodes tiles; decoded
//! images come back over a channel polled once per frame. A generation
//! counter invalidates in-flight fetches when the imagery stack changes
//! so stale tiles from a previous base layer never land in the cache.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use eframe::egui;

pub const TILE_WORKERS: usize = 4;

#[derive(Clone, Copy, Hash, Eq, PartialEq, Debug)]
pub struct TileCoord {
    pub x: u32,
    pub y: u32,
    pub z: u8,
}

/// Cache key: one cache spans all raster sources
#[derive(Clone, Hash, Eq, PartialEq, Debug)]
pub struct TileKey {
    pub source: String,
    pub coord: TileCoord,
}

struct TileRequest {
    key: TileKey,
    url: String,
    generation: u64,
}

pub struct TileFetchResult {
    pub key: TileKey,
    pub image: egui::ColorImage,
}

pub struct TileFetcher {
    tx: mpsc::Sender<TileRequest>,
    rx: mpsc::Receiver<TileFetchResult>,
    pending: HashSet<TileKey>,
    generation: Arc<AtomicU64>,
}

impl TileFetcher {
    pub fn spawn() -> Self {
        let (req_tx, req_rx) = mpsc::channel::<TileRequest>();
        let (res_tx, res_rx) = mpsc::channel::<TileFetchResult>();
        let generation = Arc::new(AtomicU64::new(0));

        let shared_rx = Arc::new(std::sync::Mutex::new(req_rx));
        for n in 0..TILE_WORKERS {
            let rx = shared_rx.clone();
            let tx = res_tx.clone();
            let gen = generation.clone();
            std::thread::Builder::new()
                .name(format!("tile-fetch-{n}"))
                .spawn(move || worker(rx, tx, gen))
                .ok();
        }

        Self {
            tx: req_tx,
            rx: res_rx,
            pending: HashSet::new(),
            generation,
        }
    }

    /// Invalidate every in-flight fetch (imagery stack changed)
    pub fn bump_generation(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.pending.clear();
    }

    pub fn request(&mut self, key: TileKey, url: String) {
        if self.pending.contains(&key) {
            return;
        }
        let request = TileRequest {
            key: key.clone(),
            url,
            generation: self.generation.load(Ordering::SeqCst),
        };
        if self.tx.send(request).is_ok() {
            self.pending.insert(key);
        }
    }

    pub fn is_pending(&self, key: &TileKey) -> bool {
        self.pending.contains(key)
    }

    /// Drain finished downloads; call once per frame
    pub fn poll(&mut self) -> Vec<TileFetchResult> {
        let mut out = Vec::new();
        while let Ok(result) = self.rx.try_recv() {
            if self.pending.remove(&result.key) {
                out.push(result);
            }
        }
        out
    }
}

fn worker(
    rx: Arc<std::sync::Mutex<mpsc::Receiver<TileRequest>>>,
    tx: mpsc::Sender<TileFetchResult>,
    generation: Arc<AtomicU64>,
) {
    let client = match reqwest::blocking::Client::builder()
        .user_agent("opsmap-canvas/0.1")
        .timeout(Duration::from_secs(15))
        .build()
    {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("tile fetch client init failed: {e}");
            return;
        }
    };

    loop {
        let request = {
            let Ok(guard) = rx.lock() else { return };
            match guard.recv() {
                Ok(r) => r,
                Err(_) => return,
            }
        };
        if request.generation != generation.load(Ordering::SeqCst) {
            continue; // stale before we even started
        }
        match fetch_one(&client, &request.url) {
            Ok(image) => {
                if request.generation != generation.load(Ordering::SeqCst) {
                    continue;
                }
                if tx.send(TileFetchResult { key: request.key, image }).is_err() {
                    return;
                }
            }
            Err(e) => {
                tracing::debug!(url = %request.url, "tile fetch failed: {e}");
            }
        }
    }
}

fn fetch_one(client: &reqwest::blocking::Client, url: &str) -> Result<egui::ColorImage, String> {
    let resp = client.get(url).send().map_err(|e| e.to_string())?;
    if !resp.status().is_success() {
        return Err(format!("status {}", resp.status()));
    }
    let bytes = resp.bytes().map_err(|e| e.to_string())?;
    let decoded = image::load_from_memory(&bytes).map_err(|e| e.to_string())?;
    let rgba = decoded.to_rgba8();
    let size = [rgba.width() as usize, rgba.height() as usize];
    Ok(egui::ColorImage::from_rgba_unmultiplied(size, rgba.as_raw()))
}

/// Slippy-map tile containing a lon/lat at zoom `z`
pub fn lon_lat_to_tile(lon: f64, lat: f64, z: u8) -> TileCoord {
    let n = (1u32 << z) as f64;
    let x = ((lon + 180.0) / 360.0 * n).floor() as i64;
    let ni = n as i64;
    let x = (((x % ni) + ni) % ni) as u32;
    let lat_rad = lat.to_radians();
    let y = ((1.0 - lat_rad.tan().asinh() / std::f64::consts::PI) / 2.0 * n).floor() as u32;
    TileCoord {
        x,
        y: y.min(n as u32 - 1),
        z,
    }
}

/// Expand an XYZ template for one tile. Export-style endpoints carry a
/// `{bbox-epsg-3857}` placeholder instead of z/x/y.
pub fn expand_template(template: &str, coord: TileCoord) -> String {
    let mut url = template
        .replace("{z}", &coord.z.to_string())
        .replace("{x}", &coord.x.to_string())
        .replace("{y}", &coord.y.to_string());
    if url.contains("{bbox-epsg-3857}") {
        let (min_x, min_y, max_x, max_y) = tile_bbox_3857(coord);
        url = url.replace(
            "{bbox-epsg-3857}",
            &format!("{min_x:.4},{min_y:.4},{max_x:.4},{max_y:.4}"),
        );
    }
    url
}

/// Web-mercator bounds of a tile in meters
fn tile_bbox_3857(coord: TileCoord) -> (f64, f64, f64, f64) {
    const EXTENT: f64 = 20_037_508.342_789_244;
    let n = (1u32 << coord.z) as f64;
    let size = 2.0 * EXTENT / n;
    let min_x = -EXTENT + coord.x as f64 * size;
    let max_y = EXTENT - coord.y as f64 * size;
    (min_x, max_y - size, min_x + size, max_y)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_math_at_origin() {
        let t = lon_lat_to_tile(0.0, 0.0, 2);
        assert_eq!((t.x, t.y, t.z), (2, 2, 2));
    }

    #[test]
    fn test_tile_x_wraps_antimeridian() {
        let t = lon_lat_to_tile(181.0, 0.0, 3);
        assert_eq!(t.x, 0);
    }

    #[test]
    fn test_expand_template() {
        let url = expand_template(
            "https://tile.openstreetmap.org/{z}/{x}/{y}.png",
            TileCoord { x: 3, y: 5, z: 7 },
        );
        assert_eq!(url, "https://tile.openstreetmap.org/7/3/5.png");
    }

    #[test]
    fn test_expand_bbox_template() {
        let url = expand_template("https://gis/export?bbox={bbox-epsg-3857}", TileCoord {
            x: 0,
            y: 0,
            z: 0,
        });
        assert!(url.contains("-20037508.3428,-20037508.3428,20037508.3428,20037508.3428"));
    }
}
