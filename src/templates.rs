//! Template stores: the static pre-trained set and the per-document
//! adapted set with its temporary/permanent configuration lifecycle.

use std::collections::BTreeMap;
use std::f32::consts::PI;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::features::{BlobFeatures, CharNormStats, OutlineFeature};
use crate::pruner::ClassPruner;
use crate::unicharset::ClassId;

/// Index of a prototype inside its class.
pub type ProtoId = usize;
/// Index of a configuration inside its class.
pub type ConfigId = usize;

/// Straight outline segment centred at (x, y).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Prototype {
    pub x: f32,
    pub y: f32,
    /// Direction as a fraction of a full turn.
    pub angle: f32,
    pub length: f32,
}

impl Prototype {
    pub fn from_outline_feature(f: &OutlineFeature) -> Self {
        Self {
            x: f.x,
            y: f.y,
            angle: f.dir,
            length: f.length,
        }
    }

    pub fn direction(&self) -> (f32, f32) {
        let theta = 2.0 * PI * self.angle;
        (theta.cos(), theta.sin())
    }

    /// Splits the prototype into `n` equal sub-segments, returned as
    /// `(centre, length)` pairs.
    pub fn pieces(&self, piece_length: f32) -> Vec<((f32, f32), f32)> {
        let n = (self.length / piece_length).round().max(1.0) as usize;
        let (ux, uy) = self.direction();
        let step = self.length / n as f32;
        (0..n)
            .map(|k| {
                let offset = (k as f32 + 0.5) * step - self.length / 2.0;
                ((self.x + ux * offset, self.y + uy * offset), step)
            })
            .collect()
    }
}

/// Growable bit set used for proto and config masks.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitVector {
    words: Vec<u64>,
}

impl BitVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, bit: usize) {
        let word = bit / 64;
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1 << (bit % 64);
    }

    pub fn test(&self, bit: usize) -> bool {
        self.words
            .get(bit / 64)
            .is_some_and(|w| w & (1 << (bit % 64)) != 0)
    }

    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }
}

impl FromIterator<usize> for BitVector {
    fn from_iter<T: IntoIterator<Item = usize>>(iter: T) -> Self {
        let mut v = BitVector::new();
        for bit in iter {
            v.set(bit);
        }
        v
    }
}

/// Prototypes of one class and the configurations built from them.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct IntClass {
    pub protos: Vec<Prototype>,
    /// One proto mask per configuration.
    pub configs: Vec<BitVector>,
    /// Mean shape statistics of the training samples.
    pub char_norm: Option<CharNormStats>,
    pub num_samples: u32,
}

impl IntClass {
    pub fn add_proto(&mut self, proto: Prototype, max_protos: usize) -> Option<ProtoId> {
        if self.protos.len() >= max_protos {
            return None;
        }
        self.protos.push(proto);
        Some(self.protos.len() - 1)
    }

    pub fn add_config(&mut self, mask: BitVector, max_configs: usize) -> Option<ConfigId> {
        if self.configs.len() >= max_configs {
            return None;
        }
        self.configs.push(mask);
        Some(self.configs.len() - 1)
    }

    fn absorb_stats(&mut self, stats: &CharNormStats) {
        let n = self.num_samples as f32;
        let mean = self.char_norm.get_or_insert(*stats);
        if n > 0.0 {
            mean.y = (mean.y * n + stats.y) / (n + 1.0);
            mean.length = (mean.length * n + stats.length) / (n + 1.0);
            mean.rx = (mean.rx * n + stats.rx) / (n + 1.0);
            mean.ry = (mean.ry * n + stats.ry) / (n + 1.0);
        }
        self.num_samples += 1;
    }
}

/// Static, character-normalized templates shared read-only by every
/// classifier working on a document batch.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IntTemplates {
    pub classes: BTreeMap<ClassId, IntClass>,
    pub pruner: ClassPruner,
    pub max_protos_per_class: usize,
    pub max_configs_per_class: usize,
}

impl IntTemplates {
    pub fn new(pruner: ClassPruner, max_protos_per_class: usize, max_configs_per_class: usize) -> Self {
        Self {
            classes: BTreeMap::new(),
            pruner,
            max_protos_per_class,
            max_configs_per_class,
        }
    }

    /// Adds one training glyph as a new configuration of `class_id`.
    pub fn add_sample(&mut self, class_id: ClassId, features: &BlobFeatures) -> Result<ConfigId, EngineError> {
        let class = self.classes.entry(class_id).or_default();
        let mut mask = BitVector::new();
        for f in &features.char_norm.outline {
            let proto = Prototype::from_outline_feature(f);
            let pid = class.add_proto(proto, self.max_protos_per_class).ok_or_else(|| {
                EngineError::InvalidTemplate(format!("class {class_id} exceeds {} protos", self.max_protos_per_class))
            })?;
            mask.set(pid);
            self.pruner.add_proto(class_id, &proto);
        }
        let config = class.add_config(mask, self.max_configs_per_class).ok_or_else(|| {
            EngineError::InvalidTemplate(format!("class {class_id} exceeds {} configs", self.max_configs_per_class))
        })?;
        class.absorb_stats(&features.stats);
        Ok(config)
    }

    pub fn class(&self, class_id: ClassId) -> Option<&IntClass> {
        self.classes.get(&class_id)
    }

    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }
}

/// Proto that has not been promoted into the pruner yet.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TempProto {
    pub proto_id: ProtoId,
    pub proto: Prototype,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TempConfig {
    pub seen: u32,
    pub protos: BitVector,
    pub max_proto_id: ProtoId,
}

impl TempConfig {
    pub fn new(protos: BitVector, max_proto_id: ProtoId) -> Self {
        Self { seen: 1, protos, max_proto_id }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ConfigState {
    Temporary(TempConfig),
    Permanent {
        /// Pre-trained classes this configuration is easily confused with.
        ambiguities: Vec<ClassId>,
    },
}

impl ConfigState {
    pub fn is_permanent(&self) -> bool {
        matches!(self, ConfigState::Permanent { .. })
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AdaptedClass {
    pub int_class: IntClass,
    pub perm_protos: BitVector,
    pub perm_configs: BitVector,
    pub temp_protos: Vec<TempProto>,
    pub configs: Vec<ConfigState>,
}

impl AdaptedClass {
    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    pub fn num_perm_configs(&self) -> usize {
        self.perm_configs.count()
    }

    pub fn config(&self, config_id: ConfigId) -> Option<&ConfigState> {
        self.configs.get(config_id)
    }
}

/// Per-document templates built from the classifier's own confident
/// recognitions, in the baseline-normalized frame.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdaptedTemplates {
    pub classes: BTreeMap<ClassId, AdaptedClass>,
    /// Indexes permanent protos only.
    pub pruner: ClassPruner,
    pub num_perm_classes: usize,
    pub num_non_empty_classes: usize,
}

impl AdaptedTemplates {
    pub fn new(pruner: ClassPruner) -> Self {
        Self {
            classes: BTreeMap::new(),
            pruner,
            num_perm_classes: 0,
            num_non_empty_classes: 0,
        }
    }

    pub fn class(&self, class_id: ClassId) -> Option<&AdaptedClass> {
        self.classes.get(&class_id)
    }

    pub fn is_empty_class(&self, class_id: ClassId) -> bool {
        self.classes.get(&class_id).map_or(true, AdaptedClass::is_empty)
    }

    /// Seeds an empty class with one temporary configuration whose protos
    /// are the glyph's outline features. Returns `false` when the glyph has
    /// too many features to be a plausible model.
    pub fn init_class(&mut self, class_id: ClassId, features: &BlobFeatures, unlikely_num_features: usize) -> bool {
        let outline = &features.baseline.outline;
        if outline.is_empty() || outline.len() > unlikely_num_features {
            return false;
        }
        let was_empty = self.is_empty_class(class_id);
        let class = self.classes.entry(class_id).or_default();
        let mut mask = BitVector::new();
        for f in outline {
            let proto = Prototype::from_outline_feature(f);
            class.int_class.protos.push(proto);
            let proto_id = class.int_class.protos.len() - 1;
            mask.set(proto_id);
            class.temp_protos.push(TempProto { proto_id, proto });
        }
        let max_proto_id = class.int_class.protos.len() - 1;
        class.int_class.configs.push(mask.clone());
        class.configs.push(ConfigState::Temporary(TempConfig::new(mask, max_proto_id)));
        if was_empty {
            self.num_non_empty_classes += 1;
        }
        true
    }

    /// Promotes a temporary configuration. Its temporary protos move into
    /// the permanent set and the pruner; each proto migrates exactly once.
    pub fn make_permanent(&mut self, class_id: ClassId, config_id: ConfigId, ambiguities: Vec<ClassId>) -> bool {
        let Some(class) = self.classes.get_mut(&class_id) else {
            return false;
        };
        let Some(ConfigState::Temporary(temp)) = class.configs.get(config_id).cloned() else {
            return false;
        };
        if class.perm_configs.is_empty() {
            self.num_perm_classes += 1;
        }
        class.perm_configs.set(config_id);

        let (promoted, kept): (Vec<TempProto>, Vec<TempProto>) = class
            .temp_protos
            .drain(..)
            .partition(|tp| tp.proto_id <= temp.max_proto_id && temp.protos.test(tp.proto_id));
        class.temp_protos = kept;
        for tp in promoted {
            class.perm_protos.set(tp.proto_id);
            self.pruner.add_proto(class_id, &tp.proto);
        }
        class.configs[config_id] = ConfigState::Permanent { ambiguities };
        true
    }

    /// Ambiguity list of a permanent configuration.
    pub fn ambiguities(&self, class_id: ClassId, config_id: ConfigId) -> Option<&[ClassId]> {
        match self.class(class_id)?.config(config_id)? {
            ConfigState::Permanent { ambiguities } => Some(ambiguities),
            ConfigState::Temporary(_) => None,
        }
    }

    pub fn total_protos(&self) -> usize {
        self.classes.values().map(|c| c.int_class.protos.len()).sum()
    }

    pub fn total_configs(&self) -> usize {
        self.classes.values().map(|c| c.configs.len()).sum()
    }
}
