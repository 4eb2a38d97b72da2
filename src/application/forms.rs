//! Submitted form payloads and their field-level errors.

use bytes::Bytes;

use crate::domain::error::DomainError;

pub const REQUIRED_MESSAGE: &str = "Обязательное поле.";
pub const UNKNOWN_GROUP_MESSAGE: &str = "Выберите корректный вариант.";
pub const INVALID_IMAGE_MESSAGE: &str =
    "Загрузите правильное изображение. Файл, который вы загрузили, поврежден или не является изображением.";

/// Field errors in insertion order; `__all__` holds form-wide messages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormErrors {
    entries: Vec<(&'static str, String)>,
}

impl FormErrors {
    pub const NON_FIELD: &'static str = "__all__";

    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.entries.push((field, message.into()));
    }

    pub fn add_domain(&mut self, error: &DomainError) {
        let field = error.field().unwrap_or(Self::NON_FIELD);
        self.add(field, domain_message(error));
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn has(&self, field: &str) -> bool {
        self.entries.iter().any(|(name, _)| *name == field)
    }

    pub fn field(&self, field: &str) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(name, _)| *name == field)
            .map(|(_, message)| message.clone())
            .collect()
    }

    pub fn non_field(&self) -> Vec<String> {
        self.field(Self::NON_FIELD)
    }

    pub fn into_result(self) -> Result<(), FormErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

fn domain_message(error: &DomainError) -> String {
    match error {
        DomainError::Blank { .. } => REQUIRED_MESSAGE.to_string(),
        DomainError::TooLong { max, .. } => {
            format!("Убедитесь, что это значение содержит не более {max} символов.")
        }
        DomainError::Malformed { kind: "username", .. } => {
            "Введите правильное имя пользователя. Оно может содержать только буквы, цифры и знаки @/./+/-/_.".to_string()
        }
        DomainError::Malformed { kind: "email", .. } => {
            "Введите правильный адрес электронной почты.".to_string()
        }
        DomainError::Malformed { kind: "password", value } if value == "too short" => {
            "Введённый пароль слишком короткий. Он должен содержать как минимум 8 символов."
                .to_string()
        }
        DomainError::Malformed { kind: "password", .. } => {
            "Введённый пароль состоит только из цифр.".to_string()
        }
        DomainError::Malformed { .. } => "Введите правильное значение.".to_string(),
    }
}

/// File part of a post form.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub filename: String,
    pub bytes: Bytes,
}

/// Raw post form as submitted, before validation.
#[derive(Debug, Clone, Default)]
pub struct PostSubmission {
    pub text: String,
    /// Group id as typed into the select; empty means "no group".
    pub group: String,
    pub image: Option<ImageUpload>,
    pub clear_image: bool,
}

#[derive(Debug, Clone, Default)]
pub struct CommentSubmission {
    pub text: String,
}

#[derive(Debug, Clone, Default)]
pub struct SignupSubmission {
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub email: String,
    pub password1: String,
    pub password2: String,
}

#[derive(Debug, Clone, Default)]
pub struct LoginSubmission {
    pub username: String,
    pub password: String,
}
