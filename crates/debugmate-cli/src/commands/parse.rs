use std::io::Read;

use anyhow::{Context, Result};
use debugmate_core::parser::parse_response;

pub fn run(input: &str) -> Result<()> {
    let raw = read_input(input)?;
    let parsed = parse_response(&raw);
    println!("{}", serde_json::to_string_pretty(&parsed)?);
    Ok(())
}

fn read_input(input: &str) -> Result<String> {
    if input == "-" {
        let mut raw = String::new();
        std::io::stdin()
            .read_to_string(&mut raw)
            .context("Failed to read stdin")?;
        return Ok(raw);
    }
    std::fs::read_to_string(input).with_context(|| format!("Failed to read {input}"))
}
