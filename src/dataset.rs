use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use burn::data::dataset::Dataset;
use image::RgbImage;
use log::{debug, info};
use thiserror::Error;

use crate::data::MaskItem;
use crate::labels::{ClassInfo, PlantClasses};
use crate::mask::{InstanceMasks, Polygon};
use crate::plant_labels::SOURCE;
use crate::via::{self, RegionError};

/// Annotation export read from each subset directory. Both subsets use the same file name.
pub const ANNOTATIONS_FILE: &str = "train.json";

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("unknown subset '{0}', expected 'train' or 'val'")]
    InvalidSubset(String),
    #[error("failed to read annotations {}: {source}", path.display())]
    ReadAnnotations {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse annotations {}: {source}", path.display())]
    ParseAnnotations {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{filename}: unknown class '{name}'")]
    UnknownClass { filename: String, name: String },
    #[error("{filename}: {source}")]
    Region {
        filename: String,
        #[source]
        source: RegionError,
    },
    #[error("failed to read image {}: {source}", path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("image index {index} out of range, dataset has {len} images")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Which half of the dataset to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subset {
    Train,
    Val,
}

impl Subset {
    pub fn as_str(&self) -> &'static str {
        match self {
            Subset::Train => "train",
            Subset::Val => "val",
        }
    }
}

impl fmt::Display for Subset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Subset {
    type Err = DatasetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "train" => Ok(Subset::Train),
            "val" => Ok(Subset::Val),
            other => Err(DatasetError::InvalidSubset(other.to_string())),
        }
    }
}

/// Everything known about one annotated image before its masks are drawn.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRecord {
    pub source: &'static str,
    pub id: String,
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub polygons: Vec<Polygon>,
    pub class_ids: Vec<i32>,
}

/// Plant disease images with polygon annotations exported by the VIA tool.
///
/// Masks are not stored. Every call to [`PlantDataset::load_mask`] draws them again from the
/// polygons, so an epoch never reuses a mask from the one before.
#[derive(Debug, Clone)]
pub struct PlantDataset {
    subset: Subset,
    classes: PlantClasses,
    images: Vec<ImageRecord>,
    image_ids: Vec<usize>,
}

impl PlantDataset {
    /// Loads one subset from `<dataset_dir>/<subset>/train.json`.
    ///
    /// The subset name is checked before anything is read, so an invalid selector such as
    /// `"test"` fails without touching the filesystem.
    pub fn load(dataset_dir: impl AsRef<Path>, subset: &str) -> Result<Self, DatasetError> {
        let subset = subset.parse::<Subset>()?;
        Self::load_subset(dataset_dir, subset)
    }

    pub fn load_subset(dataset_dir: impl AsRef<Path>, subset: Subset) -> Result<Self, DatasetError> {
        let classes = PlantClasses;
        let subset_dir = dataset_dir.as_ref().join(subset.as_str());
        let annotations_path = subset_dir.join(ANNOTATIONS_FILE);

        let json = fs::read_to_string(&annotations_path).map_err(|source| {
            DatasetError::ReadAnnotations {
                path: annotations_path.clone(),
                source,
            }
        })?;

        let annotations =
            via::parse_project(&json).map_err(|source| DatasetError::ParseAnnotations {
                path: annotations_path.clone(),
                source,
            })?;

        let mut images = vec![];

        for annotation in annotations {
            // The VIA tool exports every image of the project, annotated or not.
            if annotation.regions.is_empty() {
                debug!("Skipping {}, it has no regions", annotation.filename);
                continue;
            }

            let mut polygons = Vec::with_capacity(annotation.regions.len());
            let mut class_ids = Vec::with_capacity(annotation.regions.len());

            for region in annotation.regions.iter() {
                let region_err = |source| DatasetError::Region {
                    filename: annotation.filename.clone(),
                    source,
                };

                let polygon = region.shape_attributes.to_polygon().map_err(region_err)?;
                let name = region.class_name().map_err(region_err)?;
                let class_id =
                    classes
                        .class_id(name)
                        .ok_or_else(|| DatasetError::UnknownClass {
                            filename: annotation.filename.clone(),
                            name: name.to_string(),
                        })?;

                polygons.push(polygon);
                class_ids.push(class_id);
            }

            let path = subset_dir.join(&annotation.filename);
            let (width, height) =
                image::image_dimensions(&path).map_err(|source| DatasetError::Image {
                    path: path.clone(),
                    source,
                })?;

            images.push(ImageRecord {
                source: SOURCE,
                id: annotation.filename,
                path,
                width,
                height,
                polygons,
                class_ids,
            });
        }

        info!(
            "Loaded {} annotated images from {}",
            images.len(),
            annotations_path.display()
        );

        Ok(Self {
            subset,
            classes,
            images,
            image_ids: vec![],
        })
    }

    /// Finalizes the image index. Until this is called the data loader sees an empty dataset.
    pub fn prepare(&mut self) {
        self.image_ids = (0..self.images.len()).collect();

        let counts = self.class_counts();
        let instances: usize = counts.iter().sum();
        info!(
            "Prepared {} subset: {} images, {} instances, {} classes",
            self.subset,
            self.image_ids.len(),
            instances,
            self.classes.count()
        );

        for (class_id, count) in counts.iter().enumerate().filter(|(_, c)| **c > 0) {
            debug!(
                "  {:<28} {}",
                self.classes.name(class_id).unwrap_or("?"),
                count
            );
        }
    }

    pub fn is_prepared(&self) -> bool {
        self.image_ids.len() == self.images.len() && !self.images.is_empty()
    }

    pub fn num_images(&self) -> usize {
        self.image_ids.len()
    }

    pub fn class_info(&self) -> Vec<ClassInfo> {
        self.classes.class_info()
    }

    pub fn image_info(&self, index: usize) -> Result<&ImageRecord, DatasetError> {
        self.images
            .get(index)
            .ok_or(DatasetError::IndexOutOfRange {
                index,
                len: self.images.len(),
            })
    }

    /// Path of the image file behind `index`.
    pub fn image_reference(&self, index: usize) -> Option<&Path> {
        self.images.get(index).map(|record| record.path.as_path())
    }

    /// Instance count per class ID, background included at index `0`.
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.classes.count()];
        for id in self.images.iter().flat_map(|r| r.class_ids.iter()) {
            counts[*id as usize] += 1;
        }
        counts
    }

    /// Draws the instance masks of image `index`.
    ///
    /// # Returns
    ///
    /// A `(height, width, N)` mask array with one channel per region, and the `N` class IDs
    /// of those regions in the same order.
    pub fn load_mask(&self, index: usize) -> Result<(InstanceMasks, Vec<i32>), DatasetError> {
        let record = self.image_info(index)?;
        let masks = InstanceMasks::from_polygons(
            &record.polygons,
            record.height as usize,
            record.width as usize,
        );

        Ok((masks, record.class_ids.clone()))
    }

    /// Decodes image `index` as 8-bit RGB.
    pub fn load_image(&self, index: usize) -> Result<RgbImage, DatasetError> {
        let record = self.image_info(index)?;
        let image = image::open(&record.path).map_err(|source| DatasetError::Image {
            path: record.path.clone(),
            source,
        })?;

        Ok(image.to_rgb8())
    }

    /// Loads the image together with its masks and class IDs.
    pub fn load_item(&self, index: usize) -> Result<MaskItem, DatasetError> {
        let image = self.load_image(index)?;
        let (masks, class_ids) = self.load_mask(index)?;

        Ok(MaskItem {
            image_id: index,
            image,
            masks,
            class_ids,
        })
    }
}

impl Dataset<MaskItem> for PlantDataset {
    /// # Panics
    ///
    /// When the image behind `index` can no longer be decoded. Training cannot continue on a
    /// dataset with missing files.
    fn get(&self, index: usize) -> Option<MaskItem> {
        let image_id = *self.image_ids.get(index)?;

        Some(
            self.load_item(image_id)
                .unwrap_or_else(|e| panic!("Error loading {} image {}: {}", self.subset, image_id, e)),
        )
    }

    fn len(&self) -> usize {
        self.image_ids.len()
    }
}
