//! Scene resolution with single-scene fallback

use crate::backend::ContainerBackend;
use crate::document::Document;
use crate::error::{CziError, Result};
use crate::types::Scene;
use tracing::{info, warn};

/// Id given to the synthesized scene of containers without per-scene geometry
pub const FALLBACK_SCENE_ID: i32 = 0;

pub struct SceneLocator;

impl SceneLocator {
    /// Scenes in ascending id order. Never empty; every rectangle has a
    /// positive width and height.
    pub fn locate<B: ContainerBackend + ?Sized>(
        backend: &B,
        document: &Document,
    ) -> Result<Vec<Scene>> {
        let rectangles = backend.scene_rectangles()?;

        let scenes: Vec<Scene> = if rectangles.is_empty() {
            let rect = backend.bounding_rectangle()?;
            info!(
                "No per-scene geometry, using the whole image {rect} as scene {FALLBACK_SCENE_ID}"
            );
            vec![Scene {
                id: FALLBACK_SCENE_ID,
                rect,
            }]
        } else {
            rectangles
                .into_iter()
                .map(|(id, rect)| Scene { id, rect })
                .collect()
        };

        if let Some(scene) = scenes.iter().find(|s| s.rect.is_empty()) {
            return Err(CziError::malformed(format!(
                "scene {} has an empty bounding rectangle {}",
                scene.id, scene.rect
            )));
        }

        if scenes.len() != document.scene_count_hint {
            warn!(
                "Metadata declares {} scene(s) but the container holds {}",
                document.scene_count_hint,
                scenes.len()
            );
        }

        Ok(scenes)
    }
}
