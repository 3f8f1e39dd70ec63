//! Media Vault - Android JNI Bindings
//!
//! Exposes the vault to Kotlin/Java via JNI. `open` hands back an opaque
//! handle that every other call takes; `close` releases it.

#![cfg(feature = "android")]

use jni::objects::{JClass, JString};
use jni::sys::{jboolean, jbyteArray, jlong, jstring, JNI_FALSE, JNI_TRUE};
use jni::JNIEnv;

use crate::{MediaVault, Rendered, VaultConfig};

/// Borrow the vault behind a handle
fn vault<'a>(handle: jlong) -> Option<&'a MediaVault> {
    if handle == 0 {
        return None;
    }
    // Handles only come from `open` and stay valid until `close`
    Some(unsafe { &*(handle as *const MediaVault) })
}

fn read_string(env: &mut JNIEnv, s: &JString) -> Option<String> {
    env.get_string(s).ok().map(Into::into)
}

fn to_jstring(env: &mut JNIEnv, s: &str) -> jstring {
    match env.new_string(s) {
        Ok(s) => s.into_raw(),
        Err(_) => std::ptr::null_mut(),
    }
}

/// Open (or create) the vault under the app's private data directory
#[no_mangle]
pub extern "system" fn Java_dev_mediavault_NativeVault_open(
    mut env: JNIEnv,
    _class: JClass,
    data_dir: JString,
) -> jlong {
    let data_dir = match read_string(&mut env, &data_dir) {
        Some(d) => d,
        None => return 0,
    };

    match MediaVault::open(VaultConfig::with_data_dir(&data_dir)) {
        Ok(vault) => Box::into_raw(Box::new(vault)) as jlong,
        Err(e) => {
            log::warn!("opening vault at {} failed: {}", data_dir, e);
            0
        }
    }
}

/// Release a handle; temp files are removed
#[no_mangle]
pub extern "system" fn Java_dev_mediavault_NativeVault_close(
    _env: JNIEnv,
    _class: JClass,
    handle: jlong,
) {
    if handle != 0 {
        drop(unsafe { Box::from_raw(handle as *mut MediaVault) });
    }
}

/// Import a file by path; returns the new record id or -1
#[no_mangle]
pub extern "system" fn Java_dev_mediavault_NativeVault_importFile(
    mut env: JNIEnv,
    _class: JClass,
    handle: jlong,
    path: JString,
) -> jlong {
    let (vault, path) = match (vault(handle), read_string(&mut env, &path)) {
        (Some(v), Some(p)) => (v, p),
        _ => return -1,
    };

    match vault.import_file(&path) {
        Ok(record) => record.id,
        Err(e) => {
            log::warn!("import of {} failed: {}", path, e);
            -1
        }
    }
}

/// All records as a JSON array
#[no_mangle]
pub extern "system" fn Java_dev_mediavault_NativeVault_listFiles(
    mut env: JNIEnv,
    _class: JClass,
    handle: jlong,
) -> jstring {
    let json = vault(handle)
        .and_then(|v| v.files().ok())
        .and_then(|files| serde_json::to_string(&files).ok());

    match json {
        Some(json) => to_jstring(&mut env, &json),
        None => std::ptr::null_mut(),
    }
}

/// Decrypted content of a record
#[no_mangle]
pub extern "system" fn Java_dev_mediavault_NativeVault_readFile(
    env: JNIEnv,
    _class: JClass,
    handle: jlong,
    id: jlong,
) -> jbyteArray {
    let vault = match vault(handle) {
        Some(v) => v,
        None => return std::ptr::null_mut(),
    };

    let mut data = Vec::new();
    if let Err(e) = vault.export(id, &mut data) {
        log::warn!("reading record {} failed: {}", id, e);
        return std::ptr::null_mut();
    }

    match env.byte_array_from_slice(&data) {
        Ok(arr) => arr.into_raw(),
        Err(_) => std::ptr::null_mut(),
    }
}

/// Path of a plaintext copy for the video player, or null
#[no_mangle]
pub extern "system" fn Java_dev_mediavault_NativeVault_videoPath(
    mut env: JNIEnv,
    _class: JClass,
    handle: jlong,
    id: jlong,
) -> jstring {
    let rendered = match vault(handle).map(|v| v.view(id)) {
        Some(Ok(r)) => r,
        _ => return std::ptr::null_mut(),
    };

    match rendered {
        Rendered::Video { path, .. } => to_jstring(&mut env, &path.to_string_lossy()),
        _ => std::ptr::null_mut(),
    }
}

/// Delete a record (and its blob once unreferenced)
#[no_mangle]
pub extern "system" fn Java_dev_mediavault_NativeVault_deleteFile(
    _env: JNIEnv,
    _class: JClass,
    handle: jlong,
    id: jlong,
) -> jboolean {
    match vault(handle).map(|v| v.delete(id)) {
        Some(Ok(true)) => JNI_TRUE,
        _ => JNI_FALSE,
    }
}
