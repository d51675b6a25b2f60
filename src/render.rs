use serde_json::Value;

use crate::protocol::{StreamChunk, TokenCount};

/// Turns one stream event into the Markdown fragment appended to the
/// assistant message under construction. Pure and total: absent or odd
/// payload fields fall back to placeholders, never to a panic.
pub fn render_chunk(chunk: &StreamChunk) -> String {
    match chunk {
        StreamChunk::Content(text) => text.clone(),
        StreamChunk::FunctionCall(call) => {
            let name = call.name.as_deref().unwrap_or("unknown");
            labelled_block(
                &format!("🔧 Function Call — {}", name),
                &format_json(call.arguments.as_ref()),
            )
        }
        StreamChunk::FunctionCallResult(result) => {
            let name = result.name.as_deref().unwrap_or("unknown");
            let value = result.result.as_ref().or(result.output.as_ref());
            labelled_block(&format!("✅ Function Result — {}", name), &format_json(value))
        }
        StreamChunk::Model(name) => format!(
            "\n\n_🧠 Model Selected · {}_\n",
            name.as_deref().unwrap_or("unknown model")
        ),
        StreamChunk::Usage(usage) => format!(
            "\n\n_📊 Token Usage · Total {} | Prompt {} | Completion {}_\n",
            count_or_dash(usage.total_tokens.as_ref()),
            count_or_dash(usage.prompt_tokens.as_ref()),
            count_or_dash(usage.completion_tokens.as_ref()),
        ),
        StreamChunk::Other { data, .. } => match data {
            Value::String(text) => text.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        },
    }
}

fn labelled_block(summary: &str, body: &str) -> String {
    format!("\n\n**{}**\n\n```json\n{}\n```\n", summary, body)
}

fn format_json(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "-".to_string(),
        Some(Value::String(text)) => text.clone(),
        Some(value) => {
            serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
        }
    }
}

fn count_or_dash(count: Option<&TokenCount>) -> String {
    count.map(TokenCount::to_string).unwrap_or_else(|| "-".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{FunctionCall, FunctionCallResult, Usage};
    use serde_json::json;

    #[test]
    fn content_renders_verbatim() {
        let payloads = ["", "plain", "with\nnewlines", "**already markdown**"];
        for payload in payloads {
            let chunk = StreamChunk::Content(payload.to_string());
            assert_eq!(render_chunk(&chunk), payload);
        }
    }

    #[test]
    fn function_call_defaults_missing_name_to_unknown() {
        let chunk = StreamChunk::FunctionCall(FunctionCall {
            name: None,
            arguments: Some(json!({"q": 1})),
        });
        let rendered = render_chunk(&chunk);
        assert!(rendered.contains("🔧 Function Call — unknown"));
    }

    #[test]
    fn function_call_pretty_prints_arguments() {
        let chunk = StreamChunk::FunctionCall(FunctionCall {
            name: Some("search".to_string()),
            arguments: Some(json!({"query": "rust"})),
        });
        let rendered = render_chunk(&chunk);
        assert!(rendered.contains("🔧 Function Call — search"));
        assert!(rendered.contains("```json"));
        assert!(rendered.contains("\"query\": \"rust\""));
    }

    #[test]
    fn function_call_without_arguments_shows_dash() {
        let chunk = StreamChunk::FunctionCall(FunctionCall {
            name: Some("ping".to_string()),
            arguments: None,
        });
        assert!(render_chunk(&chunk).contains("\n-\n"));

        let chunk = StreamChunk::FunctionCall(FunctionCall {
            name: Some("ping".to_string()),
            arguments: Some(Value::Null),
        });
        assert!(render_chunk(&chunk).contains("\n-\n"));
    }

    #[test]
    fn string_arguments_pass_through_without_quoting() {
        let chunk = StreamChunk::FunctionCall(FunctionCall {
            name: Some("echo".to_string()),
            arguments: Some(json!("raw text")),
        });
        let rendered = render_chunk(&chunk);
        assert!(rendered.contains("\nraw text\n"));
        assert!(!rendered.contains("\"raw text\""));
    }

    #[test]
    fn function_result_prefers_result_over_output() {
        let chunk = StreamChunk::FunctionCallResult(FunctionCallResult {
            name: Some("fetch".to_string()),
            result: Some(json!("primary")),
            output: Some(json!("fallback")),
        });
        let rendered = render_chunk(&chunk);
        assert!(rendered.contains("✅ Function Result — fetch"));
        assert!(rendered.contains("primary"));
        assert!(!rendered.contains("fallback"));
    }

    #[test]
    fn function_result_falls_back_to_output() {
        let chunk = StreamChunk::FunctionCallResult(FunctionCallResult {
            name: None,
            result: None,
            output: Some(json!({"ok": true})),
        });
        let rendered = render_chunk(&chunk);
        assert!(rendered.contains("✅ Function Result — unknown"));
        assert!(rendered.contains("\"ok\": true"));
    }

    #[test]
    fn model_notice_names_the_model() {
        let chunk = StreamChunk::Model(Some("brook-large".to_string()));
        assert!(render_chunk(&chunk).contains("🧠 Model Selected · brook-large"));

        let chunk = StreamChunk::Model(None);
        assert!(render_chunk(&chunk).contains("🧠 Model Selected · unknown model"));
    }

    #[test]
    fn empty_usage_shows_three_dashes() {
        let chunk = StreamChunk::Usage(Usage::default());
        let rendered = render_chunk(&chunk);
        assert!(rendered.contains("Total - | Prompt - | Completion -"));
    }

    #[test]
    fn usage_counters_render_independently() {
        let chunk = StreamChunk::Usage(Usage {
            total_tokens: Some(crate::protocol::TokenCount::Count(30)),
            prompt_tokens: None,
            completion_tokens: Some(crate::protocol::TokenCount::Text("18".to_string())),
        });
        let rendered = render_chunk(&chunk);
        assert!(rendered.contains("Total 30 | Prompt - | Completion 18"));
    }

    #[test]
    fn unrecognized_tag_passes_payload_through() {
        let chunk = StreamChunk::Other {
            kind: "annotation".to_string(),
            data: json!("side note"),
        };
        assert_eq!(render_chunk(&chunk), "side note");

        let chunk = StreamChunk::Other {
            kind: "annotation".to_string(),
            data: json!({"k": "v"}),
        };
        assert_eq!(render_chunk(&chunk), r#"{"k":"v"}"#);

        let chunk = StreamChunk::Other {
            kind: "annotation".to_string(),
            data: Value::Null,
        };
        assert_eq!(render_chunk(&chunk), "");
    }

    #[test]
    fn interleaved_sequence_concatenates_in_arrival_order() {
        let chunks = vec![
            StreamChunk::Model(Some("brook-large".to_string())),
            StreamChunk::Content("The ".to_string()),
            StreamChunk::Content("answer ".to_string()),
            StreamChunk::Content("is 42.".to_string()),
            StreamChunk::Usage(Usage::default()),
        ];

        let assembled: String = chunks.iter().map(render_chunk).collect();

        let expected: String = [
            render_chunk(&chunks[0]),
            "The answer is 42.".to_string(),
            render_chunk(&chunks[4]),
        ]
        .concat();
        assert_eq!(assembled, expected);

        let model_at = assembled.find("Model Selected").expect("model notice present");
        let text_at = assembled.find("The answer").expect("content present");
        let usage_at = assembled.find("Token Usage").expect("usage notice present");
        assert!(model_at < text_at && text_at < usage_at);
    }

    #[test]
    fn rendering_is_idempotent_per_chunk() {
        let chunk = StreamChunk::FunctionCall(FunctionCall {
            name: Some("search".to_string()),
            arguments: Some(json!({"query": "rust"})),
        });
        assert_eq!(render_chunk(&chunk), render_chunk(&chunk));
    }
}
