//! Oracle prompt templates and fixed user-facing texts.
//!
//! Each prompt opens with a distinctive instruction so its purpose is obvious
//! in debug logs. The question template reuses the assessment heading from
//! `markers`, which is what later lets the log be scanned for it.

use super::markers::Marker;

/// Number of questions in every self-assessment.
pub const QUESTION_COUNT: usize = 5;

pub const OFF_TOPIC_REDIRECT: &str =
    "This topic is not allowed. Please choose a different topic for your study session.";

pub const STUDY_NUDGE: &str =
    "Let me know if you need to study more or perform a self-assessment.";

/// Stored as feedback when grading produced nothing.
pub const GRADING_DEGRADED_NOTICE: &str = "Your answers were recorded, but feedback could not \
     be generated right now. Ask for a new self-assessment whenever you are ready.";

/// Rubric for the on/off-topic gate.
pub fn topic_prompt(message: &str) -> String {
    format!(
        "Consider if this message relates to STEM education (Math, Physics, Chemistry, \
         Computer Science, Engineering) OR is part of educational workflows (self-assessment, \
         course navigation, learning materials). Respond ONLY 'yes' or 'no'. Message: \"{}\"",
        message
    )
}

pub fn readiness_prompt(message: &str) -> String {
    format!(
        "User said: \"{}\" Does this indicate readiness for a self-assessment? \
         Reply only 'yes' or 'no'.",
        message
    )
}

pub fn more_material_prompt(transcript: &str) -> String {
    format!(
        "This student is not ready. Provide additional educational materials for the user \
         based on the chosen topic according to this conversation:\n{}",
        transcript
    )
}

pub fn question_prompt(transcript: &str) -> String {
    let mut prompt = String::from(
        "You are a teacher. Based on the conversation, generate 5 self-assessment questions \
         for the user.\nFormat exactly like:\n",
    );
    prompt.push_str(Marker::AssessmentHeading.as_str());
    prompt.push('\n');
    for n in 1..=QUESTION_COUNT {
        prompt.push_str(&format!("Question {}: ...\n", n));
    }
    prompt.push('\n');
    prompt.push_str(transcript);
    prompt
}

pub fn extraction_prompt(assessment: &str, responses: &str) -> String {
    format!(
        r#"You are a strict grader. The assessment has exactly 5 questions (Q1..Q5) shown below.
The student responses (possibly multiple in one message) are also provided.
Extract answers for each question Q1..Q5 ONLY from the student's responses.

Return JSON ONLY in this exact schema (no extra commentary):

{{
  "count": <number from 0 to 5>,
  "answers": [
    {{"q": 1, "text": "<answer for Q1 or empty string if missing>"}},
    {{"q": 2, "text": "<answer for Q2 or empty string if missing>"}},
    {{"q": 3, "text": "<answer for Q3 or empty string if missing>"}},
    {{"q": 4, "text": "<answer for Q4 or empty string if missing>"}},
    {{"q": 5, "text": "<answer for Q5 or empty string if missing>"}}
  ]
}}

Rules:
- "count" is how many of Q1..Q5 have a NON-empty "text".
- Do not invent content. If an answer cannot be found, leave "text" empty.
- Output valid JSON only.

ASSESSMENT:
{assessment}

STUDENT RESPONSES:
{responses}"#
    )
}

/// Grading prompt over index-ordered `Answer <n>: <text>` lines. The question
/// block is included when the log still has it.
pub fn grading_prompt(assessment: Option<&str>, answers: &[String]) -> String {
    let mut prompt = String::from(
        "\nYou are a teaching assistant chatbot. Provide feedback on the student's 5 answers.\n\
         Title: -Self assessment result-\n",
    );
    for n in 1..=QUESTION_COUNT {
        prompt.push_str(&format!("Answer {} feedback: ...\n", n));
    }
    prompt.push_str("Conclusion: ...\n");
    if let Some(questions) = assessment {
        prompt.push_str("\nQUESTIONS:\n");
        prompt.push_str(questions);
        prompt.push('\n');
    }
    prompt.push_str("\nANSWERS:\n");
    prompt.push_str(&answers.join("\n"));
    prompt
}

/// Progress reply while answers are still missing. Never called with zero.
pub fn remaining_questions(remaining: usize) -> String {
    format!(
        "Got your answer. Please answer the remaining {} question(s).",
        remaining
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_prompt_embeds_message() {
        let prompt = topic_prompt("What is torque?");
        assert!(prompt.contains("\"What is torque?\""));
        assert!(prompt.contains("Respond ONLY 'yes' or 'no'"));
    }

    #[test]
    fn test_question_prompt_uses_heading_and_five_slots() {
        let prompt = question_prompt("user: vectors please\n");
        assert!(prompt.contains("-Self assessment-"));
        assert!(prompt.contains("Question 1: ..."));
        assert!(prompt.contains("Question 5: ..."));
        assert!(!prompt.contains("Question 6"));
        assert!(prompt.ends_with("user: vectors please\n"));
    }

    #[test]
    fn test_extraction_prompt_is_literal_json_schema() {
        let prompt = extraction_prompt("-Self assessment-\nQuestion 1: a", "my answers");
        assert!(prompt.contains(r#"{"q": 1, "text":"#));
        assert!(prompt.contains("\"count\": <number from 0 to 5>"));
        assert!(prompt.ends_with("STUDENT RESPONSES:\nmy answers"));
    }

    #[test]
    fn test_grading_prompt_lists_answers_in_order() {
        let answers: Vec<String> = (1..=5).map(|n| format!("Answer {}: a{}", n, n)).collect();
        let prompt = grading_prompt(Some("-Self assessment-\nQuestion 1: q"), &answers);
        assert!(prompt.contains("QUESTIONS:\n-Self assessment-"));
        let first = prompt.find("Answer 1: a1").unwrap();
        let last = prompt.find("Answer 5: a5").unwrap();
        assert!(first < last);

        let without = grading_prompt(None, &answers);
        assert!(!without.contains("QUESTIONS:"));
    }

    #[test]
    fn test_remaining_questions_text() {
        assert_eq!(
            remaining_questions(1),
            "Got your answer. Please answer the remaining 1 question(s)."
        );
    }
}
