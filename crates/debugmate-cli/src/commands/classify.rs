use std::path::Path;

use anyhow::Result;
use debugmate_application::{FailureInput, FixSuggestionGenerator, classify_error};
use debugmate_core::knowledge::extract_error_pattern;

use super::{load_config, open_knowledge_base};

pub fn run(kb_path: Option<&Path>, message: &str, url: Option<&str>) -> Result<()> {
    let config = load_config();
    let knowledge = open_knowledge_base(kb_path, &config)?;
    let generator = FixSuggestionGenerator::new(config.suggestions.clone(), config.language);

    let failure = FailureInput {
        error_message: message,
        url,
        console_errors: &[],
    };
    let suggestions = generator.generate(&failure, Some(&knowledge));

    let report = serde_json::json!({
        "class": classify_error(message),
        "pattern": extract_error_pattern(message),
        "suggestions": suggestions,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
