use std::sync::Arc;

use adaptocr::pruner::ClassPruner;
use adaptocr::{
    recognize_and_adapt, AdaptiveClassifier, AdaptiveWordRecognizer, Blob, Block, ClassifierConfig,
    FeatureExtractor, FixSpaceConfig, IntTemplates, MatcherConfig, Outline, OutlineFeatureExtractor, Page,
    ProgressMonitor, Row, RowContext, SpaceFixer, UnicharSet, Word, WordFlags, WordListDictionary, WordResult,
};

fn square(left: i32) -> Blob {
    Blob::new(vec![Outline::rect(left, 0, left + 20, 20)])
}

fn bar(left: i32) -> Blob {
    Blob::new(vec![Outline::rect(left, 0, left + 4, 40)])
}

fn dash(left: i32) -> Blob {
    Blob::new(vec![Outline::rect(left, 8, left + 16, 12)])
}

fn pretrained() -> (Arc<UnicharSet>, Arc<IntTemplates>) {
    let row = RowContext::default();
    let unicharset = UnicharSet::from_unichars(["o", "l", "-"]);
    let extractor = OutlineFeatureExtractor::default();
    let mut templates = IntTemplates::new(ClassPruner::new(MatcherConfig::default().pruner_buckets), 512, 32);
    for (u, blob) in [("o", square(0)), ("l", bar(0)), ("-", dash(0))] {
        let features = extractor.extract(&blob, &row).unwrap();
        templates.add_sample(unicharset.id_of(u).unwrap(), &features).unwrap();
    }
    (Arc::new(unicharset), Arc::new(templates))
}

fn classifier_with(config: ClassifierConfig, pretrained: &(Arc<UnicharSet>, Arc<IntTemplates>)) -> AdaptiveClassifier {
    AdaptiveClassifier::with_default_extractor(
        config,
        MatcherConfig::default(),
        Arc::clone(&pretrained.0),
        Arc::clone(&pretrained.1),
    )
    .unwrap()
}

fn word(blobs: Vec<Blob>, flags: WordFlags) -> WordResult {
    WordResult::new(Word::new(blobs, flags))
}

#[test]
fn cold_start_routes_through_pre_trained_templates() {
    let mut classifier = classifier_with(ClassifierConfig::default(), &pretrained());
    let choices = classifier.classify(&square(100), &RowContext::default());
    assert_eq!(choices[0].unichar, "o");
    assert_eq!(classifier.stats().adaptive_matcher_calls, 1);
    assert_eq!(classifier.stats().char_norm_classify_calls, 1);
    assert_eq!(classifier.stats().baseline_classify_calls, 0);
}

#[test]
fn confident_words_teach_the_classifier() {
    let row = RowContext::default();
    let mut classifier = classifier_with(ClassifierConfig::default(), &pretrained());
    let dict = WordListDictionary::new(["olo"]);
    let mut words = vec![word(vec![square(0), bar(24), square(40)], WordFlags::default())];

    classifier.setup_pass1();
    recognize_and_adapt(&mut classifier, &dict, &mut words, &row);

    assert_eq!(words[0].best_string(), "olo");
    assert!(words[0].tess_accepted);
    assert!(words[0].done);
    assert_eq!(classifier.stats().words_adapted_to, 1);
    // both o's match the same config, which is then permanent
    assert_eq!(classifier.adapted_templates().num_perm_classes, 1);

    let choices = classifier.classify(&square(200), &row);
    assert_eq!(choices[0].unichar, "o");
    assert_eq!(classifier.stats().baseline_classify_calls, 1);
}

#[test]
fn adapted_templates_survive_a_save_and_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("doc.adapted");
    let row = RowContext::default();
    let pre = pretrained();
    let dict = WordListDictionary::new(["olo"]);

    let config = ClassifierConfig {
        save_adapted_templates: Some(path.clone()),
        ..ClassifierConfig::default()
    };
    let mut first = classifier_with(config, &pre);
    let mut words = vec![word(vec![square(0), bar(24), square(40)], WordFlags::default())];
    recognize_and_adapt(&mut first, &dict, &mut words, &row);
    let before = first.classify(&square(0), &row);
    first.end_document().unwrap();
    assert!(path.exists());
    assert_eq!(first.adapted_templates().num_perm_classes, 0);

    let config = ClassifierConfig {
        pre_adapted_templates: Some(path),
        ..ClassifierConfig::default()
    };
    let mut second = classifier_with(config, &pre);
    assert_eq!(second.adapted_templates().num_perm_classes, 1);
    let after = second.classify(&square(0), &row);
    assert_eq!(before[0].unichar, after[0].unichar);
    assert_eq!(before[0].rating, after[0].rating);
    assert_eq!(second.stats().baseline_classify_calls, 1);
}

#[test]
fn fuzzy_space_inside_a_dictionary_word_is_closed() {
    let row_context = RowContext::default();
    let config = ClassifierConfig {
        enable_learning: false,
        ..ClassifierConfig::default()
    };
    let mut classifier = classifier_with(config, &pretrained());
    let dict = WordListDictionary::new(["olo"]);

    let first = word(vec![square(0), bar(24)], WordFlags { bol: true, ..WordFlags::default() });
    let second = word(vec![square(40)], WordFlags { fuzzy_sp: true, eol: true, ..WordFlags::default() });
    let mut page = Page {
        blocks: vec![Block {
            rows: vec![Row::new(row_context, vec![first, second])],
        }],
    };

    classifier.setup_pass1();
    for row in page.rows_mut() {
        let context = row.context;
        recognize_and_adapt(&mut classifier, &dict, &mut row.words, &context);
    }
    assert_eq!(page.text(), "ol o");

    classifier.setup_pass2();
    let monitor = ProgressMonitor::new();
    let fixspace = FixSpaceConfig::default();
    {
        let mut recognizer = AdaptiveWordRecognizer::new(&mut classifier, &dict);
        SpaceFixer::new(&fixspace, &dict, &mut recognizer).fix_fuzzy_spaces(&mut page, Some(&monitor));
    }

    assert_eq!(page.text(), "olo");
    assert_eq!(page.word_count(), 1);
    let merged = &page.blocks[0].rows[0].words[0];
    assert!(merged.done);
    assert!(merged.word.flags.bol && merged.word.flags.eol);
    assert!(monitor.progress() >= 90);
    assert!(monitor.take_alive());
    assert_eq!(classifier.stats().words_adapted_to, 0);
}
