//! Blob keys derived from a search input (mask) key.

/// Strips the extension of the last path element, if any.
pub fn key_without_ext(key: &str) -> &str {
    match key.rfind('.') {
        Some(dot) if dot > 0 && !key[dot..].contains('/') => &key[..dot],
        _ => key,
    }
}

/// File stem of the mask key, used as the mask id.
pub fn search_mask_id(key: &str) -> String {
    let stem = key_without_ext(key);
    stem.rsplit('/').next().unwrap_or(stem).to_string()
}

/// `<key without extension>.result`
pub fn search_results_key(key: &str) -> String {
    format!("{}.result", key_without_ext(key))
}

/// `<key without extension>.metadata`
pub fn search_metadata_key(key: &str) -> String {
    format!("{}.metadata", key_without_ext(key))
}

/// Replaces the last path element of `key` with `folder`.
pub fn search_sub_folder(key: &str, folder: &str) -> String {
    match key_without_ext(key).rsplit_once('/') {
        Some((dir, _)) => format!("{dir}/{folder}"),
        None => folder.to_string(),
    }
}

/// Folder holding intermediate batch payloads next to the mask.
pub fn intermediate_results_prefix(key: &str) -> String {
    search_sub_folder(key, "results")
}

/// `<mask dir>/results/batch_NNNN.json`
pub fn intermediate_results_key(key: &str, batch_id: usize) -> String {
    format!("{}/batch_{:04}.json", intermediate_results_prefix(key), batch_id)
}
