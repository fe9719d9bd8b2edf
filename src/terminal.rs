//! Sites and the camera topology built from configuration.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::camera::Camera;
use crate::naming::canonicalize;
use crate::photo::PhotoStore;
use crate::timestamp::CropRect;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraDescriptor {
    pub name: String,
    pub url: String,
    /// Overlay region; the configured default applies when absent.
    #[serde(default)]
    pub crop: Option<CropRect>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalDescriptor {
    pub name: String,
    #[serde(default)]
    pub cameras: Vec<CameraDescriptor>,
}

/// A physical site; its cameras share one photo store.
pub struct Terminal {
    name: String,
    cameras: Vec<Camera>,
    photo_store: Arc<dyn PhotoStore>,
}

impl Terminal {
    pub fn new(name: &str, photo_store: Arc<dyn PhotoStore>) -> Result<Self> {
        if canonicalize(name).is_empty() {
            return Err(anyhow!("terminal name '{}' has no usable characters", name));
        }
        Ok(Self {
            name: name.to_string(),
            cameras: Vec::new(),
            photo_store,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cameras(&self) -> &[Camera] {
        &self.cameras
    }

    pub fn photo_store(&self) -> &Arc<dyn PhotoStore> {
        &self.photo_store
    }

    /// Append a camera; its name must survive canonicalization.
    pub fn add_camera(&mut self, camera: &CameraDescriptor, default_crop: CropRect) -> Result<&Camera> {
        let camera = Camera::new(
            &self.name,
            &camera.name,
            &camera.url,
            camera.crop.unwrap_or(default_crop),
        );
        if camera.has_empty_name() {
            return Err(anyhow!(
                "camera '{}' at terminal '{}' has no usable characters",
                camera.name(),
                self.name
            ));
        }
        self.cameras.push(camera);
        Ok(&self.cameras[self.cameras.len() - 1])
    }

    /// The shared store together with mutable access to every camera.
    pub fn split_mut(&mut self) -> (&dyn PhotoStore, &mut [Camera]) {
        (self.photo_store.as_ref(), &mut self.cameras)
    }
}

impl std::fmt::Debug for Terminal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Terminal")
            .field("name", &self.name)
            .field("photo_store", &self.photo_store.name())
            .field("cameras", &self.cameras)
            .finish()
    }
}

/// Build every terminal from descriptors.
///
/// Two cameras whose full names collide would overwrite each other's
/// photos and records, so a collision rejects the whole topology.
pub fn build_terminals(
    descriptors: &[TerminalDescriptor],
    photo_store: Arc<dyn PhotoStore>,
    default_crop: CropRect,
) -> Result<Vec<Terminal>> {
    let mut seen = HashSet::new();
    let mut terminals = Vec::with_capacity(descriptors.len());
    for descriptor in descriptors {
        let mut terminal = Terminal::new(&descriptor.name, photo_store.clone())?;
        for camera in &descriptor.cameras {
            let added = terminal.add_camera(camera, default_crop)?;
            if !seen.insert(added.full_name().to_string()) {
                return Err(anyhow!(
                    "camera '{}' at terminal '{}' collides with another camera as '{}'",
                    camera.name,
                    descriptor.name,
                    added.full_name()
                ));
            }
        }
        terminals.push(terminal);
    }
    Ok(terminals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::photo::LocalPhotoStore;

    fn store() -> (tempfile::TempDir, Arc<dyn PhotoStore>) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(LocalPhotoStore::open(dir.path()).unwrap());
        (dir, store)
    }

    fn cam(name: &str) -> CameraDescriptor {
        CameraDescriptor {
            name: name.to_string(),
            url: format!("http://cams.local/{}.jpg", name.len()),
            crop: None,
        }
    }

    #[test]
    fn builds_in_order_with_default_crop() {
        let (_dir, store) = store();
        let descriptors = vec![
            TerminalDescriptor {
                name: "Main Gate".into(),
                cameras: vec![cam("Lane 1"), cam("Lane 2")],
            },
            TerminalDescriptor {
                name: "Wando Welch".into(),
                cameras: vec![CameraDescriptor {
                    crop: Some(CropRect::new(1, 2, 3, 4)),
                    ..cam("Exit")
                }],
            },
        ];
        let default_crop = CropRect::new(0, 0, 400, 40);
        let terminals = build_terminals(&descriptors, store, default_crop).unwrap();

        let names: Vec<_> = terminals
            .iter()
            .flat_map(|t| t.cameras().iter().map(|c| c.full_name().to_string()))
            .collect();
        assert_eq!(names, ["main_gate_lane_1", "main_gate_lane_2", "wando_welch_exit"]);
        assert_eq!(terminals[0].cameras()[0].crop(), default_crop);
        assert_eq!(terminals[1].cameras()[0].crop(), CropRect::new(1, 2, 3, 4));
    }

    #[test]
    fn rejects_colliding_full_names() {
        let (_dir, store) = store();
        let descriptors = vec![TerminalDescriptor {
            name: "Main Gate".into(),
            cameras: vec![cam("Lane 1"), cam("lane_1")],
        }];
        let err = build_terminals(&descriptors, store, CropRect::new(0, 0, 1, 1)).unwrap_err();
        assert!(err.to_string().contains("main_gate_lane_1"), "{}", err);
    }

    #[test]
    fn rejects_empty_names() {
        let (_dir, store) = store();
        let mut terminal = Terminal::new("Main Gate", store.clone()).unwrap();
        assert!(terminal.add_camera(&cam("!!!"), CropRect::new(0, 0, 1, 1)).is_err());
        assert!(terminal.cameras().is_empty());
        assert!(Terminal::new(" -- ", store).is_err());
    }

    #[test]
    fn descriptors_deserialize_crop_arrays() {
        let descriptor: TerminalDescriptor = toml::from_str(
            r#"
            name = "Main Gate"
            [[cameras]]
            name = "Lane 1"
            url = "http://cams.local/1.jpg"
            crop = [0, 0, 640, 48]
            "#,
        )
        .unwrap();
        assert_eq!(descriptor.cameras[0].crop, Some(CropRect::new(0, 0, 640, 48)));
    }
}
