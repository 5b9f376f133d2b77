#![allow(dead_code)]

pub mod mock_upstream;

use bytes::Bytes;

/// One upstream agent event carrying `text`, newline terminated.
pub fn agent_event(text: &str) -> String {
    format!(
        "data: {}\n\n",
        serde_json::json!({
            "content": { "role": "model", "parts": [{ "text": text }] },
            "author": "workmatch"
        })
    )
}

/// Splits a normalized SSE body into its `data:` payloads.
pub fn data_payloads(body: &Bytes) -> Vec<String> {
    let text = String::from_utf8_lossy(body);
    text.lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .map(str::to_string)
        .collect()
}

/// Delta contents of every chunk in a normalized SSE body.
pub fn chunk_contents(body: &Bytes) -> Vec<String> {
    data_payloads(body)
        .into_iter()
        .filter(|p| p != "[DONE]")
        .map(|p| {
            let chunk: serde_json::Value = serde_json::from_str(&p).unwrap();
            assert_eq!(chunk["object"], "chat.completion.chunk");
            assert_eq!(chunk["choices"][0]["index"], 0);
            assert!(chunk["choices"][0]["finish_reason"].is_null());
            chunk["choices"][0]["delta"]["content"]
                .as_str()
                .unwrap()
                .to_string()
        })
        .collect()
}
