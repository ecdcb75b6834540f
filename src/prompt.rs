//! Prompt Builder
//!
//! The optimization prompt is the only place the model is told about the
//! target dialect. Rules added here must be mirrored by `sanitize` only when
//! they can be repaired mechanically (as `TOP n` / `LIMIT n` are).

/// Persona and task framing
const PERSONA: &str = "You are an expert Snowflake SQL performance engineer.

Your task is to optimize the following SQL query for performance using only valid and executable Snowflake SQL syntax. Keep the result set identical, improve execution speed, and follow Snowflake best practices.";

/// Output-format constraint
const OUTPUT_RULES: &str = "Output:
- Return exactly one complete, executable SQL statement (including any WITH/CTE clauses it needs)
- Do not include explanations, comments, markdown, code fences, or any surrounding text";

/// Dialect rules, rendered as a numbered list
const DIALECT_RULES: &[&str] = &[
    "DO NOT use `TOP N`. Snowflake does not support it; never include `TOP` anywhere in the query.",
    "DO NOT use `LIMIT N`, neither at the end nor inside subqueries. Reduce result size with `ROW_NUMBER()` and `QUALIFY`, or with filters, instead.",
    "Prefer `QUALIFY ROW_NUMBER() OVER (...) <= N` to limit rows efficiently.",
    "Whenever `ROW_NUMBER()` or `ORDER BY` decides which rows are kept, include a unique key (e.g. `UNIQUE_SURROGATE_KEY`) in the ordering so the result is deterministic.",
];

/// `"Available columns: a, b, c"`, or empty when there are no columns
pub fn schema_hint(columns: &[String]) -> String {
    if columns.is_empty() {
        String::new()
    } else {
        format!("Available columns: {}", columns.join(", "))
    }
}

/// Render the optimization prompt. Pure and deterministic; the schema block is
/// omitted when `schema_hint` is blank and the original query always comes last.
pub fn build_optimization_prompt(query: &str, schema_hint: &str) -> String {
    let rules = DIALECT_RULES
        .iter()
        .enumerate()
        .map(|(i, rule)| format!("{}. {}", i + 1, rule))
        .collect::<Vec<_>>()
        .join("\n");

    let mut prompt = format!("{}\n\n{}\n\nRules:\n{}", PERSONA, OUTPUT_RULES, rules);

    let hint = schema_hint.trim();
    if !hint.is_empty() {
        prompt.push_str("\n\n");
        prompt.push_str(hint);
    }

    prompt.push_str("\n\nOriginal SQL Query:\n");
    prompt.push_str(query.trim());
    prompt
}
