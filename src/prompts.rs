//! Fixed instruction contracts for the three oracle tasks.

use crate::models::{Category, Commitment};

/// System prompt for commitment extraction.
pub fn extract_system_prompt() -> String {
    let categories = Category::ALL
        .iter()
        .map(|c| c.label())
        .collect::<Vec<_>>()
        .join("、");

    format!(
        r#"你是政策分析助理。請從行政院對立法委員質詢的書面答復中，找出具體、可衡量的政府政策承諾。

只輸出 JSON，格式如下：
{{"commitments": [
  {{
    "title": "承諾標題（完整一句話）",
    "short_name": "簡短名稱（20 字以內，可作為檔名，不含 / \ : * ? " < > |）",
    "category": "分類",
    "text": "原文摘錄（200 字以內）",
    "target_date": "YYYY-MM-DD、YYYY-MM 或 YYYY，沒有則為 null",
    "target_value": "量化目標，沒有則為 null",
    "responsible_agency": "主責機關，沒有則為 null"
  }}
]}}

分類只能是下列之一：{categories}。
若文件中沒有任何承諾，請輸出 {{"commitments": []}}。不要輸出 JSON 以外的任何文字。"#
    )
}

/// System prompt for the screening pass over commitment titles.
pub fn screen_system_prompt() -> String {
    r#"你是政策追蹤助理。以下提供一份新的政府文件，以及追蹤中承諾的清單（每行格式為「[id] 標題」）。
請找出文件內容可能與哪些承諾有關（進度、成果或相關資訊），寧可多選、不要漏選。

只輸出 JSON：{"related_ids": ["id", ...]}。沒有相關承諾時輸出 {"related_ids": []}。"#
        .to_string()
}

/// System prompt for verifying one screened commitment in depth.
pub fn verify_system_prompt() -> String {
    r#"你是政策追蹤助理。請判斷新的政府文件是否與指定的政策承諾有關，以及承諾是否已經達成。

只輸出 JSON：
{
  "is_related": true 或 false,
  "relation_type": "progress_update"、"fulfillment_evidence"、"related_info" 或 null,
  "summary": "一到兩句話說明文件中與此承諾相關的內容，無關則為 null",
  "is_fulfilled": true 或 false（只有文件明確指出目標已達成時才為 true）,
  "confidence": "high"、"medium"、"low" 或 null
}"#
    .to_string()
}

/// User text for a screening batch.
pub fn screen_user_text(document_text: &str, candidates: &[&Commitment]) -> String {
    let lines = candidates
        .iter()
        .map(|c| format!("[{}] {}", c.id, c.title))
        .collect::<Vec<_>>()
        .join("\n");
    format!("【文件】\n{}\n\n【追蹤中承諾】\n{}", document_text, lines)
}

/// User text for verifying one commitment against one document.
pub fn verify_user_text(document_text: &str, commitment: &Commitment) -> String {
    let mut body = format!(
        "標題：{}\n分類：{}\n原文摘錄：{}\n目前狀態：{}",
        commitment.title,
        commitment.category.label(),
        commitment.text,
        commitment.status.label()
    );
    if let Some(date) = commitment.target_date {
        body.push_str(&format!("\n目標日期：{}", date));
    }
    if let Some(ref value) = commitment.target_value {
        body.push_str(&format!("\n目標值：{}", value));
    }
    if let Some(ref agency) = commitment.responsible_agency {
        body.push_str(&format!("\n主責機關：{}", agency));
    }
    for record in commitment.tracking_history.entries() {
        body.push_str(&format!(
            "\n- {} [{}] {}",
            record.date,
            record.record_type.label(),
            record.summary
        ));
    }
    format!("【文件】\n{}\n\n【承諾】\n{}", document_text, body)
}
