//! Assistant-authored text in the configured reply language.

use debugmate_core::config::Language;

/// Shown instead of a reply when the LLM call failed.
pub fn llm_failure(language: Language) -> &'static str {
    match language {
        Language::En => "Sorry, I could not reach the language model. Please try again in a moment.",
        Language::Zh => "抱歉，暂时无法连接语言模型，请稍后重试。",
    }
}

/// First user turn of an analysis, composed from the failure.
pub fn analysis_request(language: Language, step: Option<&str>, error: &str) -> String {
    let error = if error.is_empty() {
        match language {
            Language::En => "an unknown error",
            Language::Zh => "未知错误",
        }
    } else {
        error
    };
    match (language, step) {
        (Language::En, Some(step)) => {
            format!("The step \"{step}\" failed with: {error}. What went wrong and how can I fix it?")
        }
        (Language::En, None) => format!("A test step failed with: {error}. What went wrong and how can I fix it?"),
        (Language::Zh, Some(step)) => format!("步骤「{step}」执行失败：{error}。请分析原因并给出修复建议。"),
        (Language::Zh, None) => format!("测试步骤执行失败：{error}。请分析原因并给出修复建议。"),
    }
}

/// Outcome message recorded when the operator reports a fix result.
pub fn reported_outcome(language: Language, success: bool) -> &'static str {
    match (language, success) {
        (Language::En, true) => "The operator reported that the fix worked.",
        (Language::En, false) => "The operator reported that the fix did not work.",
        (Language::Zh, true) => "操作者确认修复有效。",
        (Language::Zh, false) => "操作者确认修复无效。",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analysis_request_mentions_step_and_error() {
        let text = analysis_request(Language::En, Some("Click pay"), "timed out");
        assert!(text.contains("\"Click pay\""));
        assert!(text.contains("timed out"));
        assert!(analysis_request(Language::Zh, None, "").contains("未知错误"));
    }
}
