use crate::plant_labels::{PLANT_LABELS, SOURCE};

/// One registered class, as listed by [`PlantClasses::class_info`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassInfo {
    pub source: &'static str,
    pub id: usize,
    pub name: &'static str,
}

/// Resolves the free-text `names` attribute of an annotated region to the class ID the
/// network is trained against.
///
/// The table is fixed: IDs follow the order of [`PLANT_LABELS`], with background always at
/// index `0`. Resolution is a pure function of the name, so the same name yields the same
/// ID in every subset and every run.
#[derive(Clone, Copy, Debug, Default)]
pub struct PlantClasses;

impl PlantClasses {
    /// Returns the total number of model classes including the background class.
    pub fn count(&self) -> usize {
        PLANT_LABELS.len()
    }

    /// Maps a class name to its class ID.
    ///
    /// # Returns
    ///
    /// `Some(id)` with `1 <= id <= 28` if the name is in the table, otherwise `None`.
    /// Background is not an annotatable class and never resolves.
    pub fn class_id(&self, name: &str) -> Option<i32> {
        PLANT_LABELS
            .iter()
            .skip(1)
            .position(|label| *label == name)
            .map(|i| (i + 1) as i32)
    }

    /// Maps a class ID back to its name.
    ///
    /// Background is returned for index `0`, `None` for IDs outside the table.
    pub fn name(&self, class_id: usize) -> Option<&'static str> {
        PLANT_LABELS.get(class_id).copied()
    }

    /// Returns the dataset class names ordered by class ID, background excluded.
    pub fn names(&self) -> Vec<String> {
        PLANT_LABELS.iter().skip(1).map(|s| s.to_string()).collect()
    }

    /// Lists every class including background, in ID order.
    pub fn class_info(&self) -> Vec<ClassInfo> {
        PLANT_LABELS
            .iter()
            .enumerate()
            .map(|(id, name)| ClassInfo {
                source: if id == 0 { "" } else { SOURCE },
                id,
                name,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn plant_class_lookup_test() {
        let classes = PlantClasses;

        assert_eq!(classes.count(), 29);
        assert_eq!(classes.class_id("Apple_Black_Rot"), Some(1));
        assert_eq!(classes.class_id("Tomato_Healthy"), Some(25));
        assert_eq!(classes.class_id("Tomato_Target_Spot"), Some(28));
        assert_eq!(classes.class_id("Rasberry_Healthy"), Some(19));
        assert_eq!(classes.class_id("Strawberry_Leaf_Scroch"), Some(21));

        assert_eq!(classes.class_id("background"), None);
        assert_eq!(classes.class_id("Raspberry_Healthy"), None);
        assert_eq!(classes.class_id("tomato_healthy"), None);

        assert_eq!(classes.name(0), Some("background"));
        assert_eq!(classes.name(25), Some("Tomato_Healthy"));
        assert_eq!(classes.name(29), None);
    }

    #[test]
    fn ids_are_unique_and_round_trip_through_names() {
        let classes = PlantClasses;
        let names = classes.names();
        assert_eq!(names.len(), 28);

        let ids: HashSet<i32> = names
            .iter()
            .map(|name| classes.class_id(name).unwrap())
            .collect();
        assert_eq!(ids.len(), 28);

        for name in names.iter() {
            let id = classes.class_id(name).unwrap();
            assert_eq!(classes.class_id(name), Some(id));
            assert_eq!(classes.name(id as usize), Some(name.as_str()));
        }
    }

    #[test]
    fn class_info_lists_background_first() {
        let info = PlantClasses.class_info();
        assert_eq!(info.len(), 29);
        assert_eq!(info[0].name, "background");
        assert_eq!(info[0].source, "");
        assert!(info.iter().skip(1).all(|c| c.source == "object"));
        assert!(info.iter().enumerate().all(|(i, c)| c.id == i));
    }
}
