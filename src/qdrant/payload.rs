//! Helpers for constructing Qdrant points.

use crate::store::IndexedVector;
use serde_json::{Value, json};

/// Serialize an indexed vector into the point shape expected by `PUT /points`.
pub(crate) fn build_point(vector: &IndexedVector) -> Result<Value, serde_json::Error> {
    let payload = serde_json::to_value(&vector.metadata)?;
    Ok(json!({
        "id": vector.vector_id,
        "vector": vector.embedding,
        "payload": payload,
    }))
}

/// Render a Qdrant point id (UUID string, integer or `{ "uuid": .. }`) as a string.
pub(crate) fn stringify_point_id(id: Value) -> String {
    match id {
        Value::String(text) => text,
        Value::Number(number) => number.to_string(),
        Value::Object(map) => map
            .get("uuid")
            .map(|value| match value {
                Value::String(uuid) => uuid.clone(),
                other => other.to_string(),
            })
            .unwrap_or_else(|| Value::Object(map).to_string()),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{LOAN_DOCUMENT_TYPE, VectorMetadata, vector_id};

    #[test]
    fn point_carries_id_vector_and_payload() {
        let vector = IndexedVector {
            vector_id: vector_id("loan-1", "doc-1", 0),
            embedding: vec![0.5, 0.25],
            metadata: VectorMetadata {
                loan_id: "loan-1".into(),
                document_id: "doc-1".into(),
                document_type: "w2".into(),
                document_name: "w2.pdf".into(),
                chunk_index: 0,
                total_chunks: 1,
                kind: LOAN_DOCUMENT_TYPE.into(),
                source: LOAN_DOCUMENT_TYPE.into(),
                content_hash: "h".into(),
                text: "wages".into(),
            },
        };
        let point = build_point(&vector).expect("point");
        assert_eq!(point["id"], vector.vector_id.as_str());
        assert_eq!(point["vector"], json!([0.5, 0.25]));
        assert_eq!(point["payload"]["type"], "loan-document");
        assert_eq!(point["payload"]["text"], "wages");
    }

    #[test]
    fn point_ids_are_stringified() {
        assert_eq!(stringify_point_id(json!("abc")), "abc");
        assert_eq!(stringify_point_id(json!(42)), "42");
        assert_eq!(stringify_point_id(json!({ "uuid": "u-1" })), "u-1");
        assert_eq!(stringify_point_id(Value::Null), "");
    }
}
