//! # Principal
//! Remote rows are partitioned by the identity they belong to. A signed-in user is identified by their user id.
//! Without a session, a stable per-installation device id is used instead.

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[cfg_attr(target_arch = "wasm32", derive(tsify::Tsify))]
#[cfg_attr(target_arch = "wasm32", tsify(from_wasm_abi, into_wasm_abi))]
#[serde(tag = "kind", content = "id", rename_all = "camelCase")]
pub enum Principal {
    User(String),
    Device(String),
}

impl Principal {
    pub fn id(&self) -> &str {
        match self {
            Principal::User(id) | Principal::Device(id) => id,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Principal::User(_))
    }

    /// The value stored in the remote `principal` column.
    /// Device ids are prefixed so they can never collide with a user id.
    pub fn column_value(&self) -> String {
        match self {
            Principal::User(id) => id.clone(),
            Principal::Device(id) => format!("device:{id}"),
        }
    }
}

impl std::fmt::Display for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            Principal::User(_) => "user",
            Principal::Device(_) => "device",
        };
        write!(f, "{kind} {}", self.id())
    }
}
