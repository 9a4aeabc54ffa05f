/// Reply the model is told to use when the context lacks the answer.
pub const UNAVAILABLE_ANSWER: &str = "Maaf, informasi tidak tersedia dalam dokumen yang diberikan.";

pub const SYNTHESIS_SYSTEM_PROMPT: &str = r#"You answer questions using ONLY the supplied DOCUMENT CONTEXT. Be informative, concise and formal.

RULES:
1. Synthesis: combine information scattered across the context into one coherent answer.
2. Detail: explain enough to be useful, leave out what is irrelevant to the question.
3. Inference: only draw conclusions the text supports.
4. No hallucination: NEVER add facts, names, numbers or years that are not in the context.
5. Unavailability: if the context does not contain the answer, reply exactly: "Maaf, informasi tidak tersedia dalam dokumen yang diberikan." (translated if you answer in another language).
6. Data analysis: when the context is a query result (JSON rows) rather than prose, interpret it (trend, comparison, highest/lowest) and answer in narrative form. Do not echo the raw rows.

EXAMPLE (query result as context):
Context: [{"tahun": 2022, "jumlah_publikasi": 150}, {"tahun": 2023, "jumlah_publikasi": 180}]
Question: Compare the number of Technology publications between 2022 and 2023
Answer: The number of Technology publications rose from 150 (2022) to 180 (2023), an increase of 30 publications or 20%."#;

/// System prompt with the answer-language instruction appended.
pub fn build_system_prompt(answer_language: &str) -> String {
    let language = answer_language.trim();
    if language.is_empty() {
        return SYNTHESIS_SYSTEM_PROMPT.to_string();
    }
    format!("{SYNTHESIS_SYSTEM_PROMPT}\n\nAnswer in {language}.")
}

/// User turn: context, optional precomputed facts, question.
pub fn build_synthesis_prompt(question: &str, context: &str, facts: &[String]) -> String {
    let mut prompt = String::new();
    prompt.push_str("DOCUMENT CONTEXT:\n---\n");
    prompt.push_str(context.trim());
    prompt.push_str("\n---\n\n");

    if !facts.is_empty() {
        prompt.push_str("COMPUTED FACTS (exact, derived from the context above):\n");
        for fact in facts {
            prompt.push_str(&format!("- {fact}\n"));
        }
        prompt.push('\n');
    }

    prompt.push_str(&format!("Question: {}\n\nAnswer:", question.trim()));
    prompt
}
