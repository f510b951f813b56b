#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use pixerra::auth::{create_jwt, Actor, UserMetadata};
use pixerra::models::{Design, NewDesign, NewProfile, Profile};
use pixerra::repo::inmem::InMemRepo;
use pixerra::repo::{DesignRepo, ProfileRepo};
use pixerra::storage::{ObjectStore, StorageError};
use pixerra::AppState;
use uuid::Uuid;

pub const SECRET: &str = "test-secret-must-be-32-bytes-long!!";

pub fn set_secret() {
    std::env::set_var("JWT_SECRET", SECRET);
    std::env::remove_var("JWT_AUDIENCE");
}

pub fn token_for(id: Uuid) -> String {
    set_secret();
    create_jwt(id, Some("someone@example.com"), UserMetadata::default()).unwrap()
}

pub fn bearer(id: Uuid) -> (&'static str, String) {
    ("Authorization", format!("Bearer {}", token_for(id)))
}

pub fn state(repo: InMemRepo, store: Arc<dyn ObjectStore>) -> AppState {
    AppState { repo: Arc::new(repo), store, rate_limiter: None }
}

pub async fn profile(repo: &InMemRepo, username: &str) -> Profile {
    repo.create_profile(NewProfile {
        id: Uuid::new_v4(),
        username: username.into(),
        full_name: Some(format!("{username} full")),
        avatar_url: None,
    })
    .await
    .unwrap()
}

pub fn actor(p: &Profile) -> Actor {
    Actor::new(p.id)
}

pub async fn design(repo: &InMemRepo, owner: &Profile, title: &str) -> Design {
    repo.create_design(NewDesign {
        owner_id: owner.id,
        title: title.into(),
        description: None,
        category: Some("Branding".into()),
        image_urls: vec![format!("http://localhost/media/designs/{}/{}.png", owner.id, Uuid::new_v4().simple())],
        tags: vec![],
    })
    .await
    .unwrap()
}

// Minimal 1x1 PNG
pub fn sample_png() -> Vec<u8> {
    vec![
        0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, // signature
        0x00, 0x00, 0x00, 0x0D, b'I', b'H', b'D', b'R', 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00,
        0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F, 0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0A, b'I',
        b'D', b'A', b'T', 0x78, 0x9C, 0x63, 0x00, 0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A,
        0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, b'I', b'E', b'N', b'D', 0xAE, 0x42, 0x60, 0x82,
    ]
}

pub fn sample_jpeg() -> Vec<u8> {
    vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00, 0x01, 0x01, 0x00, 0x00, 0x01]
}

pub enum Part<'a> {
    Text(&'a str, &'a str),
    File(&'a str, &'a str, Vec<u8>),
}

/// Builds a multipart/form-data body; returns (content type, body).
pub fn multipart(parts: &[Part<'_>]) -> (String, Vec<u8>) {
    let boundary = "XBOUNDARYX";
    let mut body: Vec<u8> = Vec::new();
    for part in parts {
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                        .as_bytes(),
                );
            }
            Part::File(name, filename, bytes) => {
                body.extend_from_slice(
                    format!(
                        "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
                body.extend_from_slice(b"\r\n");
            }
        }
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={boundary}"), body)
}

/// Map-backed store whose removals can be made to fail.
#[derive(Default)]
pub struct MemStore {
    pub objects: Mutex<HashMap<String, (Vec<u8>, String)>>,
    pub fail_remove: bool,
}

#[async_trait::async_trait]
impl ObjectStore for MemStore {
    async fn put(&self, key: &str, content_type: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
        self.objects.lock().unwrap().insert(key.to_string(), (bytes, content_type.to_string()));
        Ok(())
    }
    async fn get(&self, key: &str) -> Result<(Vec<u8>, String), StorageError> {
        self.objects.lock().unwrap().get(key).cloned().ok_or(StorageError::NotFound)
    }
    async fn remove(&self, keys: &[String]) -> Result<(), StorageError> {
        if self.fail_remove {
            return Err(StorageError::Other("bucket unavailable".into()));
        }
        let mut m = self.objects.lock().unwrap();
        for k in keys {
            m.remove(k);
        }
        Ok(())
    }
    fn public_url(&self, key: &str) -> String {
        format!("http://localhost:8080/media/designs/{key}")
    }
}
