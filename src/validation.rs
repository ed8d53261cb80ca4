use serde::Deserialize;
use validator::{Validate, ValidationErrors};

use crate::catalog::MAX_RESULTS_CAP;
use crate::error::ApiError;

pub const DEFAULT_SEARCH_RESULTS: u32 = 20;
pub const DEFAULT_TRENDING_LIMIT: u32 = 20;

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct SearchParams {
    #[validate(
        required(message = "Search query is required"),
        length(min = 2, message = "Search query must be at least 2 characters long")
    )]
    pub q: Option<String>,

    #[serde(rename = "maxResults")]
    #[validate(range(min = 1, max = 40, message = "Maximum results must be between 1 and 40"))]
    pub max_results: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct TrendingParams {
    #[validate(range(min = 1, max = 40, message = "Limit must be between 1 and 40"))]
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct DashboardParams {
    #[serde(rename = "userId")]
    #[validate(
        required(message = "User ID is required"),
        length(min = 1, max = 128, message = "User ID must be 1 to 128 characters")
    )]
    pub user_id: Option<String>,
}

/// Request validation utilities
pub struct RequestValidator;

impl RequestValidator {
    /// Trimmed query and result cap for a search request
    pub fn validate_search(params: SearchParams) -> Result<(String, u32), ApiError> {
        let params = SearchParams {
            q: params.q.map(|q| q.trim().to_string()),
            ..params
        };
        params.validate().map_err(Self::to_api_error)?;

        let query = params.q.unwrap_or_default();
        let max_results = params
            .max_results
            .unwrap_or(DEFAULT_SEARCH_RESULTS)
            .min(MAX_RESULTS_CAP);
        Ok((query, max_results))
    }

    pub fn validate_trending(params: TrendingParams) -> Result<usize, ApiError> {
        params.validate().map_err(Self::to_api_error)?;
        Ok(params.limit.unwrap_or(DEFAULT_TRENDING_LIMIT) as usize)
    }

    pub fn validate_user_id(params: DashboardParams) -> Result<String, ApiError> {
        let params = DashboardParams {
            user_id: params.user_id.map(|id| id.trim().to_string()),
        };
        params.validate().map_err(Self::to_api_error)?;

        let user_id = params.user_id.unwrap_or_default();
        // Validate user_id format
        if !user_id
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '@' || c == '.')
        {
            return Err(ApiError::ValidationError(
                "User ID contains invalid characters".to_string(),
            ));
        }

        Ok(user_id)
    }

    /// Validates a catalog book id taken from the path
    pub fn validate_book_id(id: &str) -> Result<String, ApiError> {
        let id = id.trim();
        if id.is_empty() {
            return Err(ApiError::ValidationError(
                "Book ID cannot be empty".to_string(),
            ));
        }

        if !id.chars().all(|c| c.is_alphanumeric() || c == '-' || c == '_') {
            return Err(ApiError::ValidationError(
                "Book ID can only contain alphanumeric characters, hyphens, and underscores"
                    .to_string(),
            ));
        }

        Ok(id.to_string())
    }

    /// First field message, in field-name order so responses are stable.
    fn to_api_error(errors: ValidationErrors) -> ApiError {
        let field_errors = errors.field_errors();
        let mut fields: Vec<_> = field_errors.iter().collect();
        fields.sort_by(|a, b| a.0.cmp(b.0));

        let message = fields
            .into_iter()
            .flat_map(|(_, errs)| errs.iter())
            .find_map(|err| err.message.as_ref().map(|m| m.to_string()))
            .unwrap_or_else(|| errors.to_string());

        ApiError::ValidationError(message)
    }
}
