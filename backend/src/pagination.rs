//! Pagination and query helpers for the Linehaul API
//!
//! Provides standardized pagination, sorting, and filtering across all
//! listing endpoints.

use serde::{Deserialize, Serialize};

/// Default page size if not specified
pub const DEFAULT_PAGE_SIZE: i64 = 25;
/// Maximum allowed page size
pub const MAX_PAGE_SIZE: i64 = 100;
/// Default page number (1-indexed for API consumers)
pub const DEFAULT_PAGE: i64 = 1;

/// Standard pagination query parameters
#[derive(Debug, Clone, Deserialize)]
pub struct PaginationParams {
    /// Page number (1-indexed)
    #[serde(default = "default_page")]
    pub page: i64,
    /// Number of items per page
    #[serde(default = "default_per_page")]
    pub per_page: i64,
    /// Sort field
    pub sort_by: Option<String>,
    /// Sort direction (asc/desc)
    #[serde(default = "default_sort_order")]
    pub sort_order: String,
}

fn default_page() -> i64 {
    DEFAULT_PAGE
}

fn default_per_page() -> i64 {
    DEFAULT_PAGE_SIZE
}

fn default_sort_order() -> String {
    "desc".to_string()
}

impl PaginationParams {
    /// Get SQL OFFSET value
    pub fn offset(&self) -> i64 {
        let page = self.page.max(1);
        let per_page = self.per_page.clamp(1, MAX_PAGE_SIZE);
        (page - 1) * per_page
    }

    /// Get SQL LIMIT value
    pub fn limit(&self) -> i64 {
        self.per_page.clamp(1, MAX_PAGE_SIZE)
    }

    /// Get sort direction as SQL string
    pub fn sort_direction(&self) -> &str {
        if self.sort_order.to_lowercase() == "asc" {
            "ASC"
        } else {
            "DESC"
        }
    }

    /// Validate and sanitize sort field against allowed fields
    pub fn validated_sort_field(&self, allowed: &[&str], default: &str) -> String {
        self.sort_by
            .as_ref()
            .filter(|s| allowed.contains(&s.as_str()))
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            per_page: DEFAULT_PAGE_SIZE,
            sort_by: None,
            sort_order: "desc".to_string(),
        }
    }
}

/// Pagination metadata returned with list responses
#[derive(Debug, Clone, Serialize)]
pub struct PaginationMeta {
    /// Current page (1-indexed)
    pub page: i64,
    /// Items per page
    pub per_page: i64,
    /// Total number of items
    pub total: i64,
    /// Total number of pages
    pub total_pages: i64,
    /// Whether there's a next page
    pub has_next: bool,
    /// Whether there's a previous page
    pub has_prev: bool,
}

impl PaginationMeta {
    pub fn new(page: i64, per_page: i64, total: i64) -> Self {
        let total_pages = (total as f64 / per_page as f64).ceil() as i64;
        Self {
            page,
            per_page,
            total,
            total_pages,
            has_next: page < total_pages,
            has_prev: page > 1,
        }
    }
}

/// Standard paginated response wrapper
#[derive(Debug, Clone, Serialize)]
pub struct PaginatedResponse<T> {
    /// The actual data items
    pub data: Vec<T>,
    /// Pagination metadata
    pub meta: PaginationMeta,
}

impl<T> PaginatedResponse<T> {
    pub fn new(data: Vec<T>, params: &PaginationParams, total: i64) -> Self {
        Self {
            data,
            meta: PaginationMeta::new(params.page, params.limit(), total),
        }
    }
}

/// Search parameters common across entities
#[derive(Debug, Clone, Deserialize, Default)]
pub struct SearchParams {
    /// Free-text search query
    pub q: Option<String>,
    /// Filter by date from (ISO 8601)
    pub from_date: Option<chrono::NaiveDate>,
    /// Filter by date to (ISO 8601)
    pub to_date: Option<chrono::NaiveDate>,
}

impl SearchParams {
    /// Get search pattern for ILIKE queries
    pub fn search_pattern(&self) -> Option<String> {
        self.q.as_ref().map(|q| format!("%{}%", q.trim()))
    }
}

/// SQL query builder helper for dynamic filtering
#[derive(Debug, Default)]
pub struct QueryBuilder {
    conditions: Vec<String>,
    param_count: usize,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a condition (returns the parameter placeholder number). Every
    /// `{}` in the condition is replaced with the same placeholder, so one
    /// bound value can be reused across an OR group.
    pub fn add_condition(&mut self, condition: &str) -> usize {
        self.param_count += 1;
        let full_condition = condition.replace("{}", &format!("${}", self.param_count));
        self.conditions.push(full_condition);
        self.param_count
    }

    /// Add a condition that binds no parameter (e.g. `IS NULL` checks).
    pub fn add_raw(&mut self, condition: &str) {
        self.conditions.push(condition.to_string());
    }

    /// Get the WHERE clause (empty string if no conditions)
    pub fn where_clause(&self) -> String {
        if self.conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", self.conditions.join(" AND "))
        }
    }

    /// Get current parameter count
    pub fn param_count(&self) -> usize {
        self.param_count
    }
}

/// Standard list query parameters combining pagination and search
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ListParams {
    #[serde(flatten)]
    pub pagination: PaginationParams,
    #[serde(flatten)]
    pub search: SearchParams,
}

/// Job-specific list parameters
#[derive(Debug, Clone, Deserialize, Default)]
pub struct JobListParams {
    #[serde(flatten)]
    pub base: ListParams,
    /// Only jobs not yet on a billing note
    #[serde(default)]
    pub unbilled: bool,
    /// Only jobs not yet on a driver payment
    #[serde(default)]
    pub unpaid: bool,
    /// Filter by customer
    pub customer_name: Option<String>,
    /// Filter by driver
    pub driver_name: Option<String>,
}

/// Settlement-document list parameters (billing notes and driver payments)
#[derive(Debug, Clone, Deserialize, Default)]
pub struct SettlementListParams {
    #[serde(flatten)]
    pub base: ListParams,
    /// Filter by status
    pub status: Option<String>,
    /// Filter by counterparty (customer or driver) name
    pub counterparty: Option<String>,
}
