use serde_json::Value;

/// Follows a dotted path such as `presentOn.0.id` into the value.
///
/// Numeric segments index into arrays. A missing segment or an explicit `null` yields `None`.
pub fn get_value<'a>(index: &str, json: &'a Value) -> Option<&'a Value> {
    let mut current_json = json;
    for index in index.split('.') {
        current_json = match current_json {
            Value::Object(map) => map.get(index)?,
            Value::Array(items) => items.get(index.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    if current_json.is_null() {
        None
    } else {
        Some(current_json)
    }
}
