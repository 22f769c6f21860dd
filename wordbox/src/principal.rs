use mirror::data_model::Principal;

use crate::storage::{KeyValueStorage, StorageError};

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(js_namespace = ["self", "crypto"])]
    fn randomUUID() -> String;
}

pub fn get_uuid() -> String {
    #[cfg(target_arch = "wasm32")]
    {
        randomUUID()
    }

    #[cfg(not(target_arch = "wasm32"))]
    {
        uuid::Uuid::new_v4().to_string()
    }
}

/// Returns this installation's device id, creating and persisting one on first use.
pub fn get_or_create_device_id(
    storage: &mut impl KeyValueStorage,
    key: &str,
) -> Result<String, StorageError> {
    if let Some(device_id) = storage.get(key)?.filter(|id| !id.trim().is_empty()) {
        return Ok(device_id);
    }

    let device_id = get_uuid();
    storage.set(key, &device_id)?;
    log::info!("Created new device id {device_id}");
    Ok(device_id)
}

/// The signed-in user if there is one, otherwise this device.
pub fn resolve_principal(
    user_id: Option<String>,
    storage: &mut impl KeyValueStorage,
    device_id_key: &str,
) -> Result<Principal, StorageError> {
    match user_id.filter(|id| !id.is_empty()) {
        Some(user_id) => Ok(Principal::User(user_id)),
        None => get_or_create_device_id(storage, device_id_key).map(Principal::Device),
    }
}
