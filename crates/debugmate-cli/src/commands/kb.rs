use std::path::Path;

use anyhow::{Context, Result};

use super::{load_config, open_knowledge_base};

pub fn stats(kb_path: Option<&Path>) -> Result<()> {
    let knowledge = open_knowledge_base(kb_path, &load_config())?;
    println!("{}", serde_json::to_string_pretty(&knowledge.stats())?);
    Ok(())
}

pub fn query(kb_path: Option<&Path>, text: &str, limit: usize) -> Result<()> {
    let knowledge = open_knowledge_base(kb_path, &load_config())?;
    let matches = knowledge.find_matching_patterns(text, limit);
    if matches.is_empty() {
        eprintln!("No matching entries");
    }
    println!("{}", serde_json::to_string_pretty(&matches)?);
    Ok(())
}

pub fn export(kb_path: Option<&Path>, output: Option<&Path>) -> Result<()> {
    let knowledge = open_knowledge_base(kb_path, &load_config())?;
    let json = knowledge.export()?;
    match output {
        Some(path) => {
            std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("Exported {} entries to {}", knowledge.len(), path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

pub fn import(kb_path: Option<&Path>, file: &Path) -> Result<()> {
    let json = std::fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let mut knowledge = open_knowledge_base(kb_path, &load_config())?;
    let imported = knowledge.import(&json)?;
    knowledge.save()?;
    eprintln!("Imported {} entries ({} total)", imported, knowledge.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use debugmate_core::config::AssistantConfig;
    use debugmate_core::knowledge::NewKnowledgeEntry;
    use debugmate_core::suggestion::{FixSuggestion, SuggestionType};
    use tempfile::TempDir;

    #[test]
    fn test_export_then_import_into_another_file() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("source.json");
        let target = dir.path().join("target.json");
        let dump = dir.path().join("dump.json");

        let config = AssistantConfig::default();
        let mut knowledge = open_knowledge_base(Some(&source), &config).unwrap();
        knowledge.add_entry(NewKnowledgeEntry::new(
            "element not found",
            vec![FixSuggestion::new(SuggestionType::Wait, "Wait for it", 0.8)],
        ));
        knowledge.save().unwrap();

        export(Some(&source), Some(&dump)).unwrap();
        import(Some(&target), &dump).unwrap();

        let reopened = open_knowledge_base(Some(&target), &config).unwrap();
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.stats().total_fixes, 1);
    }
}
