use thiserror::Error;

use crate::store::StoreError;

/// Failure of a single document or allocation request. Nothing is retried.
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("{entity} not found: id={id}")]
    NotFound { entity: &'static str, id: String },

    #[error("template {name} unavailable: {reason}")]
    TemplateUnavailable { name: String, reason: String },

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("document serialization failed: {0}")]
    Serialize(String),
}

impl GenerationError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        GenerationError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// HTTP-equivalent status for the response layer.
    pub fn status_code(&self) -> u16 {
        match self {
            GenerationError::NotFound { .. } => 404,
            GenerationError::StoreUnavailable(_) => 503,
            _ => 500,
        }
    }

    /// Short message shown to the end user.
    pub fn user_message(&self) -> String {
        match self {
            GenerationError::NotFound { entity, .. } => match *entity {
                "agreement" => "Договор не найден".to_string(),
                "billing period" => "Акт не найден".to_string(),
                "organization" => "Организация не найдена".to_string(),
                _ => "Запись не найдена".to_string(),
            },
            GenerationError::StoreUnavailable(_) => {
                "Удаленная база данных недоступна, попробуйте позже.".to_string()
            }
            GenerationError::TemplateUnavailable { name, .. } => {
                format!("Шаблон {name} недоступен")
            }
            GenerationError::InvalidAmount(_) => "Некорректная сумма".to_string(),
            GenerationError::Serialize(_) => "Ошибка при формировании документа".to_string(),
        }
    }
}

impl From<StoreError> for GenerationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => GenerationError::NotFound { entity, id },
            StoreError::Unavailable(msg) => GenerationError::StoreUnavailable(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::GenerationError;
    use crate::store::StoreError;

    #[test]
    fn status_codes_follow_kind() {
        assert_eq!(GenerationError::not_found("agreement", 7).status_code(), 404);
        assert_eq!(
            GenerationError::from(StoreError::Unavailable("down".into())).status_code(),
            503
        );
        assert_eq!(GenerationError::Serialize("zip".into()).status_code(), 500);
    }

    #[test]
    fn store_not_found_keeps_entity() {
        let err = GenerationError::from(StoreError::NotFound {
            entity: "billing period",
            id: "12".into(),
        });
        assert_eq!(err.user_message(), "Акт не найден");
        assert_eq!(err.to_string(), "billing period not found: id=12");
    }
}
