//! Page-context JavaScript used by the adapter primitives.

use crate::error::{AdapterError, AdapterErrorKind};

pub const DOCUMENT_TITLE: &str = "document.title";
pub const DOCUMENT_HTML: &str =
    "document.documentElement ? document.documentElement.outerHTML : ''";
pub const LOCATION_HREF: &str = "location.href";

fn literal(value: &str) -> Result<String, AdapterError> {
    serde_json::to_string(value)
        .map_err(|err| AdapterError::new(AdapterErrorKind::Internal).with_hint(err.to_string()))
}

pub fn selector_exists(selector: &str) -> Result<String, AdapterError> {
    Ok(format!(
        "document.querySelector({}) !== null",
        literal(selector)?
    ))
}

/// Scrolls the element into view and returns its centre, or `null`.
pub fn element_center(selector: &str) -> Result<String, AdapterError> {
    Ok(format!(
        r#"(() => {{
    const el = document.querySelector({sel});
    if (!el) {{ return null; }}
    el.scrollIntoView({{ block: 'center', inline: 'center' }});
    const rect = el.getBoundingClientRect();
    return {{ x: rect.left + rect.width / 2, y: rect.top + rect.height / 2 }};
}})()"#,
        sel = literal(selector)?
    ))
}

/// Focuses the element and clears its value; returns `false` when missing.
pub fn prepare_fill(selector: &str) -> Result<String, AdapterError> {
    Ok(format!(
        r#"(() => {{
    const el = document.querySelector({sel});
    if (!el) {{ return false; }}
    el.focus();
    if ('value' in el) {{ el.value = ''; }}
    el.dispatchEvent(new Event('input', {{ bubbles: true }}));
    return true;
}})()"#,
        sel = literal(selector)?
    ))
}

pub fn dispatch_change(selector: &str) -> Result<String, AdapterError> {
    Ok(format!(
        r#"(() => {{
    const el = document.querySelector({sel});
    if (el) {{ el.dispatchEvent(new Event('change', {{ bubbles: true }})); }}
}})()"#,
        sel = literal(selector)?
    ))
}

/// Sets a `<select>` value and replays the events a user pick would fire.
pub fn select_value(selector: &str, value: &str) -> Result<String, AdapterError> {
    Ok(format!(
        r#"(() => {{
    const el = document.querySelector({sel});
    if (!el) {{ return false; }}
    el.value = {val};
    for (const type of ['mousedown', 'click', 'input', 'change']) {{
        el.dispatchEvent(new Event(type, {{ bubbles: true }}));
    }}
    return true;
}})()"#,
        sel = literal(selector)?,
        val = literal(value)?
    ))
}

pub fn scroll_by(dy: i64) -> String {
    format!("window.scrollBy(0, {dy})")
}
