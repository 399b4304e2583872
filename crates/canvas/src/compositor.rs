//! Mounts base/overlay imagery onto the surface, diffing against what it
//! previously added. The compositor only ever removes layers and sources in
//! its own ledger, so entity/markup layers owned by other components are
//! never disturbed, and it inserts everything below the stable entity
//! anchor so markers stay on top across re-compositions.

use shared::{LayerKind, MapLayer};

use crate::draw::{MARKUP_FILL_LAYER, MARKUP_STATIC_FILL_LAYER};
use crate::entities::NODE_LAYER;
use crate::surface::{LayerSpec, SourceSpec, SurfaceHandle};
use crate::tiles;

/// Entity layer that imagery is always inserted beneath
pub const ANCHOR_LAYER: &str = NODE_LAYER;

/// Non-imagery layers imagery must stay beneath, lowest first. Markup sits
/// below the entity markers, so a mounted markup set is the tighter anchor.
const ANCHOR_LAYERS: &[&str] = &[MARKUP_FILL_LAYER, MARKUP_STATIC_FILL_LAYER, ANCHOR_LAYER];

fn insertion_anchor(surface: &SurfaceHandle) -> Option<&'static str> {
    ANCHOR_LAYERS.iter().copied().find(|id| surface.has_layer(id))
}

#[derive(Default)]
pub struct LayerCompositor {
    managed_layers: Vec<String>,
    managed_sources: Vec<String>,
    signature: Vec<String>,
}

impl LayerCompositor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-compose the imagery stack: effective base layer first, then
    /// enabled overlays by `(z_index, id)`. A no-op when the resolved stack
    /// is unchanged.
    pub fn compose(&mut self, surface: &SurfaceHandle, layers: &[MapLayer]) {
        let plan = resolve(layers);
        let signature: Vec<String> = plan
            .iter()
            .map(|(layer, spec)| {
                format!(
                    "{}|{}|{}",
                    layer.id,
                    layer.opacity,
                    serde_json::to_string(spec).unwrap_or_default()
                )
            })
            .collect();
        if signature == self.signature {
            return;
        }

        for id in self.managed_layers.drain(..) {
            surface.remove_layer(&id);
        }
        for id in self.managed_sources.drain(..) {
            surface.remove_source(&id);
        }

        for (layer, spec) in plan {
            let source_id = format!("layer-src-{}", layer.id);
            surface.add_source(&source_id, spec.clone());
            self.managed_sources.push(source_id.clone());

            let before = insertion_anchor(surface);
            for style in style_layers(layer, &spec, &source_id) {
                self.managed_layers.push(style.id().to_string());
                surface.add_layer(style, before);
            }
        }
        self.signature = signature;
    }

    /// Remove everything in the ledger (teardown path)
    pub fn clear(&mut self, surface: &SurfaceHandle) {
        for id in self.managed_layers.drain(..) {
            surface.remove_layer(&id);
        }
        for id in self.managed_sources.drain(..) {
            surface.remove_source(&id);
        }
        self.signature.clear();
    }
}

/// Resolve the desired stack: last enabled base wins, overlays sorted by
/// `(z_index asc, id asc)`. Unbuildable sources are skipped with a warning.
fn resolve(layers: &[MapLayer]) -> Vec<(&MapLayer, SourceSpec)> {
    let base = layers
        .iter()
        .filter(|l| l.kind == LayerKind::Base && l.enabled)
        .last();

    let mut overlays: Vec<&MapLayer> = layers
        .iter()
        .filter(|l| l.kind == LayerKind::Overlay && l.enabled)
        .collect();
    overlays.sort_by_key(|l| (l.z_index, l.id));

    base.into_iter()
        .chain(overlays)
        .filter_map(|layer| match tiles::build_source(layer) {
            Some(spec) => Some((layer, spec)),
            None => {
                tracing::warn!(layer_id = layer.id, name = %layer.name, "skipping layer with incomplete source config");
                None
            }
        })
        .collect()
}

fn style_layers(layer: &MapLayer, spec: &SourceSpec, source_id: &str) -> Vec<LayerSpec> {
    let opacity = layer.opacity.clamp(0.0, 1.0);
    match spec {
        SourceSpec::RasterTiles { .. } => vec![LayerSpec::Raster {
            id: format!("layer-{}", layer.id),
            source: source_id.to_string(),
            opacity,
        }],
        SourceSpec::RasterDem { .. } => vec![LayerSpec::Hillshade {
            id: format!("layer-{}-hillshade", layer.id),
            source: source_id.to_string(),
            // opacity-scaled, floored so an enabled layer never renders flat
            exaggeration: 0.3 + 0.7 * opacity,
        }],
        SourceSpec::GeoJson { .. } => vec![
            LayerSpec::Fill {
                id: format!("layer-{}-fill", layer.id),
                source: source_id.to_string(),
                color: None,
                opacity: opacity * 0.4,
            },
            LayerSpec::Line {
                id: format!("layer-{}-line", layer.id),
                source: source_id.to_string(),
                color: None,
                width: 2.0,
                opacity,
            },
            LayerSpec::Circle {
                id: format!("layer-{}-circle", layer.id),
                source: source_id.to_string(),
                color: None,
                radius: 5.0,
                hover_radius: 5.0,
                opacity,
            },
        ],
    }
}
