/// Disease and healthy-leaf categories of the plant disease dataset, ten crop species in total.
///
/// The index of each entry is the class ID the annotations are trained against. Index `0` is
/// reserved for the background class every Mask R-CNN head predicts in addition to the dataset
/// classes.
///
/// The spellings follow the `names` region attribute written by the annotators, including
/// `Rasberry_Healthy` and `Strawberry_Leaf_Scroch`.
pub const PLANT_LABELS: [&str; 29] = [
    "background", // Placeholder
    "Apple_Black_Rot",
    "Apple_Healthy",
    "Apple_Rust",
    "Apple_Scab",
    "Blueberry_Healthy",
    "Corn_Common_Rust",
    "Corn_Gray_Leaf_Spot",
    "Corn_Healthy",
    "Grape_Black_Measles",
    "Grape_Black_Rot",
    "Grape_Healthy",
    "Peach_Bacterial_Spot",
    "Peach_Healthy",
    "Pepper_Bell_Bacterial_Spot",
    "Pepper_Bell_Healthy",
    "Pepper_Early_Blight",
    "Potato_Healthy",
    "Potato_Late_Blight",
    "Rasberry_Healthy",
    "Soybean_Healthy",
    "Strawberry_Leaf_Scroch",
    "Strawberry_Healthy",
    "Tomato_Bacterial_Spot",
    "Tomato_Early_Blight",
    "Tomato_Healthy",
    "Tomato_Late_Blight",
    "Tomato_Leaf_Spot",
    "Tomato_Target_Spot",
];

/// Annotation source tag every class and image of this dataset is registered under.
pub const SOURCE: &str = "object";
