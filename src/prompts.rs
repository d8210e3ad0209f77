//! Prompts for the pitch-deck assessment request.
//!
//! The request is two messages: an instruction that sets the reviewer's role,
//! then a task message carrying the deck text. Callers can replace the
//! instruction via [`crate::config::PipelineConfig::system_prompt`]; the task
//! template is fixed.

/// Default instruction message.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a venture capitalist looking to invest in a startup. \
You have been given a startup's pitch deck. You are asked to extract key information from the \
document and provide a recommendation on whether to invest in the startup or not.";

/// Sections the assessment is structured into, in output order.
pub const REPORT_SECTIONS: &[&str] = &[
    "Name of the product",
    "Team (in this format: <NAME>: <TITLE> - <OTHER INFO>)",
    "Traction",
    "Problem",
    "Solution",
    "Market",
    "Market Size",
    "Product-Market Fit",
    "Go-to-market (GTM) Strategy",
    "Target Customers",
    "Competition",
    "Business Model",
    "Revenue Model",
    "a concise summary of the content below (maximum of 80 words)",
    "a longer summary of the content below (maximum of 200 words)",
    "a critical, step by step, guide on how to assess the risks of investing in this startup",
    "a recommendation on whether to invest in the startup or not",
];

/// Placeholder replaced with the deck text in [`TASK_TEMPLATE`].
pub const CONTENT_PLACEHOLDER: &str = "{content}";

/// Task message template; `{sections}` and `{content}` are filled by [`task_prompt`].
pub const TASK_TEMPLATE: &str = "TASK:
Extract key information from the content below. The content is the text of a pitch deck. \
Only use the content provided and be as precise (include important numbers) and concise as possible. \
Structure your answer into the following sections:
{sections}.
Only include the sections if the relevant information is present in the content. \
Use structure for each section if relevant, like a list or table.
Include a header for each section. Format the output in Markdown.

CONTENT: {content}

ANSWER:
";

/// Build the task message for `content` (the deck's joined text).
pub fn task_prompt(content: &str) -> String {
    TASK_TEMPLATE
        .replace("{sections}", &REPORT_SECTIONS.join(", "))
        .replace(CONTENT_PLACEHOLDER, content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_prompt_embeds_content_once() {
        let prompt = task_prompt("Acme Robotics Series A $5M");
        assert!(prompt.starts_with("TASK:"));
        assert_eq!(prompt.matches("Acme Robotics Series A $5M").count(), 1);
        assert!(prompt.trim_end().ends_with("ANSWER:"));
        assert!(!prompt.contains("{sections}"));
        assert!(!prompt.contains(CONTENT_PLACEHOLDER));
    }

    #[test]
    fn every_section_is_requested() {
        let prompt = task_prompt("");
        for section in REPORT_SECTIONS {
            assert!(prompt.contains(section), "missing section {section}");
        }
    }

    #[test]
    fn content_with_braces_is_left_alone() {
        let prompt = task_prompt("ARR {2023}: $1M");
        assert!(prompt.contains("ARR {2023}: $1M"));
    }
}
