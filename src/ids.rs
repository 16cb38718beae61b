use rand::Rng;

/// Generate an opaque id: `prefix` + `_` + 24 random hex chars.
pub fn new_id(prefix: &str) -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 12] = rng.random();
    format!("{prefix}_{}", hex::encode(bytes))
}

pub fn request_id() -> String {
    new_id("req")
}

pub fn history_id() -> String {
    new_id("hist")
}

pub fn version_id() -> String {
    new_id("ver")
}
