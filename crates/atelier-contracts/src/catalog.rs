use indexmap::IndexMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pose {
    pub id: String,
    pub name: String,
    pub description: String,
    pub preview_url: String,
}

/// Immutable pose library, loaded once at startup. Insertion order is
/// display order.
#[derive(Debug, Clone)]
pub struct PoseCatalog {
    poses: IndexMap<String, Pose>,
}

impl PoseCatalog {
    pub fn new(poses: Option<IndexMap<String, Pose>>) -> Self {
        Self {
            poses: poses.unwrap_or_else(default_poses),
        }
    }

    pub fn get(&self, id: &str) -> Option<&Pose> {
        self.poses.get(id)
    }

    pub fn list(&self) -> impl Iterator<Item = &Pose> {
        self.poses.values()
    }

    pub fn len(&self) -> usize {
        self.poses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }
}

impl Default for PoseCatalog {
    fn default() -> Self {
        Self::new(None)
    }
}

fn default_poses() -> IndexMap<String, Pose> {
    let mut map = IndexMap::new();

    let mut insert = |id: &str, name: &str, description: &str| {
        map.insert(
            id.to_string(),
            Pose {
                id: id.to_string(),
                name: name.to_string(),
                description: description.to_string(),
                preview_url: format!("https://picsum.photos/seed/{id}/400/600"),
            },
        );
    };

    insert(
        "runway-walk",
        "Runway Walk",
        "Walking forward confidently, looking at camera",
    );
    insert(
        "hands-on-hips",
        "Hands on Hips",
        "Standing with hands on hips, powerful stance",
    );
    insert(
        "stool-sit",
        "Stool Sit",
        "Sitting elegantly on a high stool",
    );
    insert(
        "over-shoulder",
        "Over the Shoulder",
        "Looking back over the shoulder, 3/4 turn",
    );
    insert(
        "jump-shot",
        "Jump Shot",
        "Jumping in the air, dynamic motion shot",
    );
    insert(
        "wall-lean",
        "Wall Lean",
        "Leaning against a wall casually",
    );
    insert(
        "arms-crossed",
        "Arms Crossed",
        "Arms crossed, confident look",
    );
    insert(
        "portrait-touch",
        "Portrait Touch",
        "Close up portrait, hand touching face",
    );

    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_catalog_has_eight_poses() {
        let catalog = PoseCatalog::default();
        assert_eq!(catalog.len(), 8);
        assert!(!catalog.is_empty());
    }

    #[test]
    fn lookup_by_id() {
        let catalog = PoseCatalog::default();
        let pose = catalog.get("stool-sit").map(|pose| pose.name.as_str());
        assert_eq!(pose, Some("Stool Sit"));
        assert!(catalog.get("backflip").is_none());
    }

    #[test]
    fn list_preserves_insertion_order() {
        let catalog = PoseCatalog::default();
        let first = catalog.list().next().map(|pose| pose.id.as_str());
        assert_eq!(first, Some("runway-walk"));
    }

    #[test]
    fn descriptions_double_as_generation_instructions() {
        let catalog = PoseCatalog::default();
        for pose in catalog.list() {
            assert!(!pose.description.trim().is_empty());
            assert!(pose.preview_url.starts_with("https://"));
        }
    }
}
