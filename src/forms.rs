//! Form input and validation. Cleaning never touches storage: callers pass in
//! whatever lookup data a form needs (e.g. the group choices).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::{Group, Id};

pub const REQUIRED: &str = "This field is required.";
pub const INVALID_CHOICE: &str = "Select a valid choice. That choice is not one of the available choices.";
pub const INVALID_IMAGE: &str =
    "Upload a valid image. The file you uploaded was either not an image or a corrupted image.";
pub const IMAGE_TOO_LARGE: &str = "The uploaded image is larger than 10 MB.";
pub const INVALID_USERNAME: &str =
    "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.";
pub const USERNAME_TAKEN: &str = "A user with that username already exists.";
pub const PASSWORD_TOO_SHORT: &str = "This password is too short. It must contain at least 8 characters.";
pub const BAD_CREDENTIALS: &str = "Please enter a correct username and password.";
pub const WRONG_OLD_PASSWORD: &str = "Your old password was entered incorrectly. Please enter it again.";
pub const TEXT_TOO_LONG: &str = "Ensure this value has at most 65536 bytes.";
pub const INVALID_TEXT: &str = "Enter valid UTF-8 text.";
pub const UNREADABLE_FORM: &str = "The submitted form could not be read.";

pub const IMAGE_SIZE_LIMIT: usize = 10 * 1024 * 1024; // 10 MB
/// Cap for the non-file fields of a multipart post form.
pub const TEXT_FIELD_LIMIT: usize = 64 * 1024;
pub const USERNAME_MAX_LEN: usize = 150;
pub const PASSWORD_MIN_LEN: usize = 8;

/// Field name → messages. Non-field errors go under `__all__`.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub const NON_FIELD: &'static str = "__all__";

    pub fn single(field: &str, msg: &str) -> Self {
        let mut errors = Self::default();
        errors.add(field, msg);
        errors
    }

    pub fn add(&mut self, field: &str, msg: &str) {
        self.0.entry(field.to_string()).or_default().push(msg.to_string());
    }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }
}

/// Post/comment body: surrounding whitespace is stripped and nothing may
/// remain empty.
pub fn clean_text(raw: &str) -> Result<String, &'static str> {
    let text = raw.trim();
    if text.is_empty() { Err(REQUIRED) } else { Ok(text.to_string()) }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Upload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageUpload {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub mime: String,
}

fn clean_image(upload: &Upload) -> Result<Option<ImageUpload>, &'static str> {
    if upload.bytes.is_empty() && upload.filename.is_empty() {
        return Ok(None); // file input left blank
    }
    if upload.bytes.len() > IMAGE_SIZE_LIMIT {
        return Err(IMAGE_TOO_LARGE);
    }
    match infer::get(&upload.bytes) {
        Some(kind) if kind.mime_type().starts_with("image/") => Ok(Some(ImageUpload {
            filename: upload.filename.clone(),
            bytes: upload.bytes.clone(),
            mime: kind.mime_type().to_string(),
        })),
        _ => Err(INVALID_IMAGE),
    }
}

/// Create/edit post form as submitted (multipart).
#[derive(Debug, Default, Clone, Serialize)]
pub struct PostForm {
    pub text: String,
    /// Group id, or empty for no group.
    pub group: String,
    #[serde(skip)]
    pub image: Option<Upload>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CleanPost {
    pub text: String,
    pub group_id: Option<Id>,
    pub image: Option<ImageUpload>,
}

impl PostForm {
    pub fn clean(&self, groups: &[Group]) -> Result<CleanPost, FieldErrors> {
        let mut errors = FieldErrors::default();

        let text = clean_text(&self.text).map_err(|m| errors.add("text", m)).ok();

        let group_id = match self.group.trim() {
            "" => Some(None),
            raw => raw
                .parse::<Id>()
                .ok()
                .filter(|id| groups.iter().any(|g| g.id == *id))
                .map(Some),
        };
        if group_id.is_none() {
            errors.add("group", INVALID_CHOICE);
        }

        let image = match &self.image {
            Some(upload) => clean_image(upload).map_err(|m| errors.add("image", m)).ok(),
            None => Some(None),
        };

        match (text, group_id, image) {
            (Some(text), Some(group_id), Some(image)) if errors.is_empty() => {
                Ok(CleanPost { text, group_id, image })
            }
            _ => Err(errors),
        }
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize, ToSchema)]
pub struct CommentForm {
    #[serde(default)]
    pub text: String,
}

impl CommentForm {
    pub fn clean(&self) -> Result<String, FieldErrors> {
        clean_text(&self.text).map_err(|m| FieldErrors::single("text", m))
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize, ToSchema)]
pub struct SignupForm {
    #[serde(default)]
    pub username: String,
    #[serde(default, skip_serializing)]
    pub password: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

pub fn valid_username(name: &str) -> bool {
    let len = name.chars().count();
    (1..=USERNAME_MAX_LEN).contains(&len)
        && name.chars().all(|c| c.is_alphanumeric() || "@.+-_".contains(c))
}

impl SignupForm {
    /// Field checks only; username uniqueness is settled by storage.
    pub fn clean(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::default();
        let username = self.username.trim();
        if username.is_empty() {
            errors.add("username", REQUIRED);
        } else if !valid_username(username) {
            errors.add("username", INVALID_USERNAME);
        }
        if self.password.is_empty() {
            errors.add("password", REQUIRED);
        } else if self.password.chars().count() < PASSWORD_MIN_LEN {
            errors.add("password", PASSWORD_TOO_SHORT);
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default, skip_serializing)]
    pub password: String,
    pub next: Option<String>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize, ToSchema)]
pub struct PasswordChangeForm {
    #[serde(default, skip_serializing)]
    pub old_password: String,
    #[serde(default, skip_serializing)]
    pub new_password: String,
}

impl PasswordChangeForm {
    pub fn clean(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::default();
        if self.old_password.is_empty() {
            errors.add("old_password", REQUIRED);
        }
        if self.new_password.is_empty() {
            errors.add("new_password", REQUIRED);
        } else if self.new_password.chars().count() < PASSWORD_MIN_LEN {
            errors.add("new_password", PASSWORD_TOO_SHORT);
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}
