//! # Record
//! A record is the unit of mirroring: one value per key, always written and read as a whole.
//! Records travel to the remote as flat JSON rows, so every record type decides its own column layout here.
//! This keeps the local storage layout free to differ from the remote schema.

pub trait Record: Sized + Clone + PartialEq {
    fn to_json(&self) -> Result<serde_json::Value, serde_json::Error>;
    fn from_json(json: &serde_json::Value) -> Result<Self, serde_json::Error>;
}
