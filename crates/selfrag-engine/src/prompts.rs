//! Prompt templates for the generator, the three gates and the rewriter
//!
//! Every template is rendered through [`PromptBuilder`] so the sections
//! always appear in the same order: system, context, question, instructions.

use selfrag_core::{join_passages, Passage};

/// Canonical grounded label expected from the hallucination grader
pub const GROUNDED_LABEL: &str = "not hallucinated";

/// Canonical ungrounded label expected from the hallucination grader
pub const HALLUCINATED_LABEL: &str = "hallucinated";

// ============================================================================
// Prompt Builder
// ============================================================================

/// Builder for constructing sectioned prompts
pub struct PromptBuilder {
    system_instruction: String,
    context_sections: Vec<String>,
    question: String,
    instructions: Vec<String>,
}

impl PromptBuilder {
    /// Create a new prompt builder
    pub fn new() -> Self {
        Self {
            system_instruction: String::new(),
            context_sections: Vec::new(),
            question: String::new(),
            instructions: Vec::new(),
        }
    }

    /// Set system instruction
    pub fn system(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = instruction.into();
        self
    }

    /// Add a context section
    pub fn add_context(mut self, context: impl Into<String>) -> Self {
        self.context_sections.push(context.into());
        self
    }

    /// Set the question
    pub fn question(mut self, q: impl Into<String>) -> Self {
        self.question = q.into();
        self
    }

    /// Add an instruction
    pub fn add_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instructions.push(instruction.into());
        self
    }

    /// Build the final prompt
    pub fn build(self) -> String {
        let mut prompt = String::new();

        if !self.system_instruction.is_empty() {
            prompt.push_str("<s>\n");
            prompt.push_str(&self.system_instruction);
            prompt.push_str("\n</s>\n\n");
        }

        if !self.context_sections.is_empty() {
            prompt.push_str("<context>\n");
            for section in &self.context_sections {
                prompt.push_str(section);
                prompt.push_str("\n\n");
            }
            prompt.push_str("</context>\n\n");
        }

        if !self.question.is_empty() {
            prompt.push_str("<question>\n");
            prompt.push_str(&self.question);
            prompt.push_str("\n</question>\n\n");
        }

        if !self.instructions.is_empty() {
            prompt.push_str("<instructions>\n");
            for (i, inst) in self.instructions.iter().enumerate() {
                prompt.push_str(&format!("{}. {}\n", i + 1, inst));
            }
            prompt.push_str("</instructions>\n");
        }

        prompt
    }
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Templates
// ============================================================================

/// Question-answering prompt used by the generator
pub fn answer_prompt(question: &str, context: &[Passage]) -> String {
    PromptBuilder::new()
        .system(
            "You are an assistant for question-answering tasks. \
             Use the following pieces of retrieved context to answer the question.",
        )
        .add_context(join_passages(context))
        .question(question)
        .add_instruction("If you don't know the answer, just say that you don't know.")
        .add_instruction("Use three sentences maximum and keep the answer concise.")
        .build()
}

/// 1-10 relevance rubric for the retrieved facts
pub fn relevance_prompt(question: &str, context: &[Passage]) -> String {
    PromptBuilder::new()
        .system(
            "You are a teacher grading a quiz. You will be given a QUESTION and a set of \
             FACTS provided by the student. Your goal is to identify how relevant the FACTS \
             are to the QUESTION on a scale of 1 to 10.",
        )
        .add_context(format!("FACTS:\n{}", join_passages(context)))
        .question(question)
        .add_instruction(
            "If the facts contain keywords, direct answers, or semantic meaning strongly \
             related to the question, give a high score (close to 10).",
        )
        .add_instruction("If there is only a weak or tangential relation, give a mid score (4-6).")
        .add_instruction(
            "If the facts are only minimally or indirectly related, give a low score (1-3).",
        )
        .add_instruction("If the facts are completely unrelated, give a score of 1.")
        .add_instruction(
            "Explain your reasoning step by step before stating the score. \
             Avoid simply stating the correct answer at the outset.",
        )
        .add_instruction(
            "Respond with a JSON object only: \
             {\"Score\": <1-10>, \"Explanation\": \"<reasoning>\"}",
        )
        .build()
}

/// Groundedness check of an answer against the retrieved documents
pub fn hallucination_prompt(answer: &str, context: &[Passage]) -> String {
    PromptBuilder::new()
        .system(
            "You are a teacher evaluating whether a student's answer is based on the \
             given documents or not.",
        )
        .add_context(format!("DOCUMENTS:\n{}", join_passages(context)))
        .add_context(format!("STUDENT ANSWER:\n{answer}"))
        .add_instruction(format!(
            "If the student's answer is based on the documents, respond with \"{GROUNDED_LABEL}\"."
        ))
        .add_instruction(format!(
            "If the student's answer is not based on the documents, \
             respond with \"{HALLUCINATED_LABEL}\"."
        ))
        .add_instruction("Respond with the label only.")
        .build()
}

/// Binary helpfulness rubric for an answer
pub fn helpfulness_prompt(question: &str, answer: &str) -> String {
    PromptBuilder::new()
        .system(
            "You are a teacher grading a quiz. You will be given a QUESTION and a STUDENT \
             ANSWER. Grade whether the answer is helpful for the question.",
        )
        .add_context(format!("STUDENT ANSWER:\n{answer}"))
        .question(question)
        .add_instruction(
            "A score of 1 means the answer is concise and relevant and helps answer the question.",
        )
        .add_instruction("A score of 0 means the answer does not help answer the question.")
        .add_instruction("Explain your reasoning step by step before stating the score.")
        .add_instruction(
            "Respond with a JSON object only: \
             {\"Score\": <0 or 1>, \"Explanation\": \"<reasoning>\"}",
        )
        .build()
}

/// Query reformulation against the substitution glossary
pub fn rewrite_prompt(question: &str, glossary: &[String]) -> String {
    let entries = glossary
        .iter()
        .map(|entry| format!("- {entry}"))
        .collect::<Vec<_>>()
        .join("\n");

    PromptBuilder::new()
        .system(
            "Look at the user's question and rewrite it using the terms in our glossary.",
        )
        .add_context(format!("GLOSSARY:\n{entries}"))
        .question(question)
        .add_instruction("Keep the meaning of the question unchanged.")
        .add_instruction("Respond with the rewritten question only.")
        .build()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_builder() {
        let prompt = PromptBuilder::new()
            .system("You are a helpful assistant.")
            .add_context("Context from document A")
            .add_context("Context from document B")
            .question("What is the answer?")
            .add_instruction("Be concise")
            .add_instruction("Cite sources")
            .build();

        assert!(prompt.starts_with("<s>\nYou are a helpful assistant."));
        assert!(prompt.contains("<context>"));
        assert!(prompt.contains("What is the answer?"));
        assert!(prompt.contains("1. Be concise\n2. Cite sources"));
    }

    #[test]
    fn test_empty_builder_is_empty() {
        assert!(PromptBuilder::default().build().is_empty());
    }

    #[test]
    fn test_answer_prompt_keeps_passage_order() {
        let context = vec![Passage::new("alpha"), Passage::new("beta")];
        let prompt = answer_prompt("q?", &context);

        assert!(prompt.contains("alpha\n\nbeta"));
        assert!(prompt.contains("<question>\nq?\n</question>"));
    }

    #[test]
    fn test_hallucination_prompt_names_both_labels() {
        let prompt = hallucination_prompt("an answer", &[Passage::new("doc")]);
        assert!(prompt.contains("\"not hallucinated\""));
        assert!(prompt.contains("\"hallucinated\""));
        assert!(prompt.contains("STUDENT ANSWER:\nan answer"));
    }

    #[test]
    fn test_rewrite_prompt_lists_glossary() {
        let glossary = vec![
            "person-referring expressions -> resident".to_string(),
            "car park -> parking facility".to_string(),
        ];
        let prompt = rewrite_prompt("Can a person remove it?", &glossary);

        assert!(prompt.contains("- person-referring expressions -> resident\n- car park"));
        assert!(prompt.contains("Can a person remove it?"));
    }
}
