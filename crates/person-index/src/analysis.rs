use tantivy::tokenizer::{
    AsciiFoldingFilter, LowerCaser, RemoveLongFilter, SimpleTokenizer, TextAnalyzer,
    TokenizerManager,
};

pub const PERSON_ANALYZER: &str = "person_text";

/// Analyzer for the searchable person fields (id, bio, category).
///
/// Splits on non-alphanumerics, lowercases and folds accents so "José" and
/// "jose" index the same; very long tokens (base64 blobs, URLs) are dropped.
pub fn register_person_analyzer(manager: &TokenizerManager) {
    let analyzer = TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(RemoveLongFilter::limit(255))
        .filter(LowerCaser)
        .filter(AsciiFoldingFilter)
        .build();

    manager.register(PERSON_ANALYZER, analyzer);
}

/// Run `text` through the person analyzer and return the resulting terms.
pub fn analyze(manager: &TokenizerManager, text: &str) -> Vec<String> {
    let Some(mut analyzer) = manager.get(PERSON_ANALYZER) else {
        return Vec::new();
    };
    let mut terms = Vec::new();
    let mut stream = analyzer.token_stream(text);
    stream.process(&mut |token| terms.push(token.text.clone()));
    terms
}
