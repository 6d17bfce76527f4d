//! Tool dispatcher — the five named entry points external code drives the
//! controller through. One function per capability, dispatched through a
//! small enum, the way the teacher crate lays out one module per tool
//! family under `tools/`; here the "family" is flat enough that one
//! function per tool is the right granularity instead of a submodule each.
//!
//! Every tool returns the same envelope regardless of outcome:
//! `{ "content": [{"type":"text","text":"<JSON>"}], "isError"?: true }` —
//! bit-exact, since callers on the other side of a protocol boundary
//! pattern-match on this shape.

use serde_json::{json, Value};

use crate::config::Metric;
use crate::controller::CacheController;
use crate::embedder::Embedder;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    AiComplete,
    CacheCheck,
    CacheStore,
    CacheStats,
    GenerateEmbedding,
}

impl Tool {
    pub fn name(self) -> &'static str {
        match self {
            Tool::AiComplete => "ai_complete",
            Tool::CacheCheck => "cache_check",
            Tool::CacheStore => "cache_store",
            Tool::CacheStats => "cache_stats",
            Tool::GenerateEmbedding => "generate_embedding",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "ai_complete" => Some(Tool::AiComplete),
            "cache_check" => Some(Tool::CacheCheck),
            "cache_store" => Some(Tool::CacheStore),
            "cache_stats" => Some(Tool::CacheStats),
            "generate_embedding" => Some(Tool::GenerateEmbedding),
            _ => None,
        }
    }
}

fn envelope(payload: Value) -> Value {
    json!({ "content": [{ "type": "text", "text": payload.to_string() }] })
}

fn error_envelope(tool: Tool, message: impl Into<String>) -> Value {
    json!({
        "content": [{
            "type": "text",
            "text": json!({ "error": message.into(), "tool": tool.name() }).to_string(),
        }],
        "isError": true,
    })
}

fn str_field<'a>(params: &'a Value, field: &str) -> Result<&'a str, String> {
    params
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("missing or empty required field: {field}"))
}

fn embedding_field(params: &Value, field: &str) -> Result<Option<Vec<f32>>, String> {
    match params.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| v.as_f64().map(|f| f as f32).ok_or_else(|| format!("{field} must be an array of numbers")))
            .collect::<Result<Vec<f32>, String>>()
            .map(Some),
        Some(_) => Err(format!("{field} must be an array of numbers")),
    }
}

fn similarity_threshold_field(params: &Value) -> Result<Option<f32>, String> {
    match params.get("similarityThreshold") {
        None | Some(Value::Null) => Ok(None),
        Some(v) => {
            let t = v.as_f64().ok_or("similarityThreshold must be a number")? as f32;
            if (0.0..=1.0).contains(&t) {
                Ok(Some(t))
            } else {
                Err("similarityThreshold must be within [0, 1]".to_string())
            }
        }
    }
}

pub async fn dispatch(
    controller: &CacheController,
    embedder: &dyn Embedder,
    tool: Tool,
    params: Value,
) -> Value {
    let result = match tool {
        Tool::AiComplete => ai_complete(controller, &params).await,
        Tool::CacheCheck => cache_check(controller, &params).await,
        Tool::CacheStore => cache_store(controller, embedder, &params).await,
        Tool::CacheStats => cache_stats(controller).await,
        Tool::GenerateEmbedding => generate_embedding(embedder, &params).await,
    };

    match result {
        Ok(payload) => envelope(payload),
        Err(message) => error_envelope(tool, message),
    }
}

async fn ai_complete(controller: &CacheController, params: &Value) -> Result<Value, String> {
    let prompt = str_field(params, "prompt")?;
    let embedding = embedding_field(params, "embedding")?;
    let threshold = similarity_threshold_field(params)?;

    match controller
        .lookup(prompt, embedding.as_deref(), threshold)
        .await
        .map_err(|e| e.to_string())?
    {
        Some(hit) => Ok(json!({
            "cached": true,
            "response": hit.response,
            "similarity": hit.similarity,
            "isExactMatch": hit.is_exact_match,
            "cachedAt": hit.cached_at,
        })),
        None => Ok(json!({
            "cached": false,
            "message": "Cache miss, no semantically similar prompt found.",
        })),
    }
}

async fn cache_check(controller: &CacheController, params: &Value) -> Result<Value, String> {
    let prompt = str_field(params, "prompt")?;
    let embedding = embedding_field(params, "embedding")?;
    let threshold = similarity_threshold_field(params)?;

    match controller
        .lookup(prompt, embedding.as_deref(), threshold)
        .await
        .map_err(|e| e.to_string())?
    {
        Some(hit) => Ok(json!({
            "found": true,
            "response": hit.response,
            "similarity": hit.similarity,
            "isExactMatch": hit.is_exact_match,
            "cachedAt": hit.cached_at,
        })),
        None => Ok(json!({
            "found": false,
            "message": "No cached entry found for this prompt.",
        })),
    }
}

async fn cache_store(
    controller: &CacheController,
    embedder: &dyn Embedder,
    params: &Value,
) -> Result<Value, String> {
    let prompt = str_field(params, "prompt")?;
    let response = str_field(params, "response")?;
    let ttl = match params.get("ttl") {
        None | Some(Value::Null) => None,
        Some(v) => Some(v.as_u64().ok_or("ttl must be a non-negative integer")?),
    };

    let embedding = match embedding_field(params, "embedding")? {
        Some(e) => e,
        None => embedder
            .generate(prompt)
            .await
            .map_err(|e| format!("Embedding required and generation failed: {e}"))?
            .vector,
    };

    controller
        .insert(prompt, response, &embedding, ttl)
        .await
        .map_err(|e| e.to_string())?;

    Ok(json!({ "success": true, "hasEmbedding": true }))
}

async fn cache_stats(controller: &CacheController) -> Result<Value, String> {
    serde_json::to_value(controller.stats().await).map_err(|e| e.to_string())
}

async fn generate_embedding(embedder: &dyn Embedder, params: &Value) -> Result<Value, String> {
    let text = str_field(params, "text")?;
    let embedding = embedder.generate(text).await.map_err(|e| e.to_string())?;
    Ok(json!({ "embedding": embedding.vector, "model": embedding.model }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Backend, Config};
    use crate::embedder::StubEmbedder;

    fn config() -> Config {
        Config {
            dim: 4,
            max_elements: 100,
            similarity_threshold: 0.85,
            memory_limit: "1gb".into(),
            default_ttl_seconds: None,
            backend: Backend::TreeForest,
            metric: Metric::Cosine,
        }
    }

    #[tokio::test]
    async fn cache_store_then_ai_complete_round_trips() {
        let controller = CacheController::new(config()).unwrap();
        let embedder = StubEmbedder::new(4);

        let store = dispatch(
            &controller,
            &embedder,
            Tool::CacheStore,
            json!({ "prompt": "What is ML?", "response": "ML is AI.", "embedding": [1.0, 0.0, 0.0, 0.0] }),
        )
        .await;
        assert_eq!(store["isError"], Value::Null);

        let complete = dispatch(
            &controller,
            &embedder,
            Tool::AiComplete,
            json!({ "prompt": "what   is ml?" }),
        )
        .await;
        let text = complete["content"][0]["text"].as_str().unwrap();
        let parsed: Value = serde_json::from_str(text).unwrap();
        assert_eq!(parsed["cached"], true);
        assert_eq!(parsed["response"], "ML is AI.");
    }

    #[tokio::test]
    async fn cache_store_without_embedding_uses_embedder() {
        let controller = CacheController::new(config()).unwrap();
        let embedder = StubEmbedder::new(4);

        let store = dispatch(
            &controller,
            &embedder,
            Tool::CacheStore,
            json!({ "prompt": "foo", "response": "bar" }),
        )
        .await;
        let text = store["content"][0]["text"].as_str().unwrap();
        let parsed: Value = serde_json::from_str(text).unwrap();
        assert_eq!(parsed["success"], true);
    }

    #[tokio::test]
    async fn missing_required_field_is_an_error_envelope() {
        let controller = CacheController::new(config()).unwrap();
        let embedder = StubEmbedder::new(4);

        let result = dispatch(&controller, &embedder, Tool::AiComplete, json!({})).await;
        assert_eq!(result["isError"], true);
    }

    #[tokio::test]
    async fn out_of_range_similarity_threshold_is_an_error_envelope() {
        let controller = CacheController::new(config()).unwrap();
        let embedder = StubEmbedder::new(4);

        let result = dispatch(
            &controller,
            &embedder,
            Tool::CacheCheck,
            json!({ "prompt": "foo", "similarityThreshold": 1.5 }),
        )
        .await;
        assert_eq!(result["isError"], true);
    }

    #[tokio::test]
    async fn cache_stats_reports_json() {
        let controller = CacheController::new(config()).unwrap();
        let embedder = StubEmbedder::new(4);
        let result = dispatch(&controller, &embedder, Tool::CacheStats, json!({})).await;
        let text = result["content"][0]["text"].as_str().unwrap();
        let parsed: Value = serde_json::from_str(text).unwrap();
        assert!(parsed["totalEntries"].is_number());
    }

    #[tokio::test]
    async fn generate_embedding_delegates_to_embedder() {
        let controller = CacheController::new(config()).unwrap();
        let embedder = StubEmbedder::new(4);
        let result = dispatch(
            &controller,
            &embedder,
            Tool::GenerateEmbedding,
            json!({ "text": "hello" }),
        )
        .await;
        let text = result["content"][0]["text"].as_str().unwrap();
        let parsed: Value = serde_json::from_str(text).unwrap();
        assert_eq!(parsed["embedding"].as_array().unwrap().len(), 4);
    }
}
