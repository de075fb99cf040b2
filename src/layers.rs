use std::{fmt, str::FromStr, sync::OnceLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Output layers of the COCO checkpoint whose shapes depend on the class count.
///
/// They are skipped when loading pretrained weights, so the heads start fresh for the
/// 29 plant classes.
pub const HEAD_EXCLUDES: [&str; 4] = ["mrcnn_class_logits", "mrcnn_bbox_fc", "mrcnn_bbox", "mrcnn_mask"];

/// Groups of Mask R-CNN layers that can be trained while the rest stay frozen.
///
/// Each group selects layers by name. `From3` to `From5` train the ResNet backbone from that
/// stage upwards together with the heads, `All` trains every layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TrainableLayers {
    /// Region proposal network, feature pyramid and mask/class/box heads.
    #[default]
    #[serde(rename = "heads")]
    Heads,
    #[serde(rename = "3+")]
    From3,
    #[serde(rename = "4+")]
    From4,
    #[serde(rename = "5+")]
    From5,
    #[serde(rename = "all")]
    All,
}

impl TrainableLayers {
    pub fn as_list() -> Vec<TrainableLayers> {
        vec![
            TrainableLayers::Heads,
            TrainableLayers::From3,
            TrainableLayers::From4,
            TrainableLayers::From5,
            TrainableLayers::All,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TrainableLayers::Heads => "heads",
            TrainableLayers::From3 => "3+",
            TrainableLayers::From4 => "4+",
            TrainableLayers::From5 => "5+",
            TrainableLayers::All => "all",
        }
    }

    /// Regex over layer names selecting the trainable layers of this group.
    pub fn pattern(&self) -> &'static str {
        match self {
            TrainableLayers::Heads => r"(mrcnn_.*)|(rpn_.*)|(fpn_.*)",
            TrainableLayers::From3 => r"(res3.*)|(bn3.*)|(res4.*)|(bn4.*)|(res5.*)|(bn5.*)|(mrcnn_.*)|(rpn_.*)|(fpn_.*)",
            TrainableLayers::From4 => r"(res4.*)|(bn4.*)|(res5.*)|(bn5.*)|(mrcnn_.*)|(rpn_.*)|(fpn_.*)",
            TrainableLayers::From5 => r"(res5.*)|(bn5.*)|(mrcnn_.*)|(rpn_.*)|(fpn_.*)",
            TrainableLayers::All => ".*",
        }
    }

    /// Whether the layer called `name` is trained, matching the whole name.
    pub fn is_trainable(&self, name: &str) -> bool {
        self.regex().is_match(name)
    }

    fn regex(&self) -> &'static Regex {
        static REGEXES: OnceLock<Vec<Regex>> = OnceLock::new();

        let regexes = REGEXES.get_or_init(|| {
            TrainableLayers::as_list()
                .iter()
                .map(|layers| {
                    Regex::new(&format!("^(?:{})$", layers.pattern()))
                        .unwrap_or_else(|e| panic!("Invalid layer pattern {}: {}", layers.pattern(), e))
                })
                .collect()
        });

        &regexes[*self as usize]
    }
}

impl fmt::Display for TrainableLayers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown layer selection '{0}', expected one of heads, 3+, 4+, 5+, all")]
pub struct ParseLayersError(pub String);

impl FromStr for TrainableLayers {
    type Err = ParseLayersError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TrainableLayers::as_list()
            .into_iter()
            .find(|layers| layers.as_str() == s)
            .ok_or_else(|| ParseLayersError(s.to_string()))
    }
}
