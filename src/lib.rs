//! # adaptocr - adaptive classification and word-spacing repair
//!
//! The two middle stages of a classic page OCR pipeline:
//!
//! - an **adaptive character classifier** that matches glyph outlines against
//!   static pre-trained templates and grows a per-document template set from
//!   words it recognized confidently;
//! - a **word-spacing repair** pass that re-decides uncertain spaces by
//!   rescoring alternative merges of adjacent words, and splits fixed-pitch
//!   words where a speck of noise was glued in place of a space.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use adaptocr::{
//!     persistence, AdaptiveClassifier, AdaptiveWordRecognizer, EngineConfig, Page, SpaceFixer,
//!     WordListDictionary,
//! };
//!
//! let config = EngineConfig::from_json_file("engine.json")?;
//! let bundle = persistence::load_pretrained("eng.templates")?;
//! let dict = WordListDictionary::from_file("eng.words")?;
//! let mut classifier = AdaptiveClassifier::with_default_extractor(
//!     config.classifier.clone(),
//!     config.matcher.clone(),
//!     Arc::new(bundle.unicharset),
//!     Arc::new(bundle.templates),
//! )?;
//!
//! let mut page: Page = serde_json::from_str(&std::fs::read_to_string("page.json")?)?;
//! for row in page.rows_mut() {
//!     let context = row.context;
//!     adaptocr::recognize_and_adapt(&mut classifier, &dict, &mut row.words, &context);
//! }
//!
//! classifier.setup_pass2();
//! let mut recognizer = AdaptiveWordRecognizer::new(&mut classifier, &dict);
//! SpaceFixer::new(&config.fixspace, &dict, &mut recognizer).fix_fuzzy_spaces(&mut page, None);
//! println!("{}", page.text());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod blob;
pub mod classifier;
pub mod dict;
pub mod error;
pub mod features;
pub mod fixspace;
pub mod geometry;
pub mod matcher;
pub mod monitor;
pub mod noise;
pub mod page;
pub mod persistence;
pub mod pruner;
pub mod recognizer;
pub mod results;
pub mod templates;
pub mod types;
pub mod unicharset;
pub mod word;

pub use crate::blob::{Blob, Outline, RowContext};
pub use crate::classifier::{AdaptiveClassifier, ClassifierStats};
pub use crate::dict::{Dictionary, Permuter, WordListDictionary};
pub use crate::error::EngineError;
pub use crate::features::{BlobFeatures, FeatureExtractor, OutlineFeatureExtractor};
pub use crate::fixspace::SpaceFixer;
pub use crate::geometry::{BoundingBox, Point};
pub use crate::monitor::ProgressMonitor;
pub use crate::page::{Block, Page, Row};
pub use crate::recognizer::{recognize_and_adapt, AdaptiveWordRecognizer, WordRecognizer};
pub use crate::results::BlobChoice;
pub use crate::templates::{AdaptedTemplates, IntTemplates};
pub use crate::types::{ClassifierConfig, EngineConfig, FixSpaceConfig, MatcherConfig};
pub use crate::unicharset::{ClassId, UnicharSet};
pub use crate::word::{RejectMap, Word, WordChoice, WordFlags, WordResult};
