use std::str::FromStr;

use async_trait::async_trait;
use common_types::SimilarProduct;
use sqlx::PgPool;

/// Read-only nearest-neighbour lookups over the product catalogue.
#[async_trait]
pub trait SimilarityStore: Send + Sync {
    /// The `limit` products closest to `embedding`, closest first.
    async fn nearest(
        &self,
        embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<SimilarProduct>, sqlx::Error>;
}

/// pgvector distance operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceMetric {
    Cosine,
    Euclidean,
    InnerProduct,
}

impl DistanceMetric {
    pub fn operator(&self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "<=>",
            DistanceMetric::Euclidean => "<->",
            DistanceMetric::InnerProduct => "<#>",
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseDistanceMetricError(pub String);

impl std::fmt::Display for ParseDistanceMetricError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} is not a supported distance metric", self.0)
    }
}

impl std::error::Error for ParseDistanceMetricError {}

impl FromStr for DistanceMetric {
    type Err = ParseDistanceMetricError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cosine" => Ok(DistanceMetric::Cosine),
            "euclidean" | "l2" => Ok(DistanceMetric::Euclidean),
            "inner_product" | "ip" => Ok(DistanceMetric::InnerProduct),
            other => Err(ParseDistanceMetricError(other.to_owned())),
        }
    }
}

pub struct PgSimilarityStore {
    pool: PgPool,
    query: String,
}

impl PgSimilarityStore {
    pub fn new(pool: PgPool, table: &str, metric: DistanceMetric) -> Self {
        Self {
            pool,
            query: nearest_products_query(table, metric),
        }
    }
}

#[async_trait]
impl SimilarityStore for PgSimilarityStore {
    async fn nearest(
        &self,
        embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<SimilarProduct>, sqlx::Error> {
        sqlx::query_as::<_, SimilarProduct>(&self.query)
            .bind(to_vector_literal(embedding))
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
    }
}

fn nearest_products_query(table: &str, metric: DistanceMetric) -> String {
    format!(
        "SELECT COALESCE(title, '') AS title,
            COALESCE(description, '') AS description,
            price::float8 AS price
        FROM {}
        WHERE embedding IS NOT NULL AND price IS NOT NULL
        ORDER BY embedding {} $1::vector
        LIMIT $2",
        quote_identifier(table),
        metric.operator()
    )
}

/// pgvector's text input format: `[0.1,-0.2,...]`.
pub fn to_vector_literal(embedding: &[f32]) -> String {
    let values: Vec<String> = embedding.iter().map(|v| v.to_string()).collect();
    format!("[{}]", values.join(","))
}

// Table names can't be bound as parameters.
fn quote_identifier(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_literal() {
        assert_eq!(to_vector_literal(&[0.5, -0.25, 3.0]), "[0.5,-0.25,3]");
        assert_eq!(to_vector_literal(&[]), "[]");
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("Product"), "\"Product\"");
        assert_eq!(quote_identifier("odd\"name"), "\"odd\"\"name\"");
    }

    #[test]
    fn test_query_orders_by_metric_operator() {
        let query = nearest_products_query("Product", DistanceMetric::Cosine);
        assert!(query.contains("FROM \"Product\""));
        assert!(query.contains("WHERE embedding IS NOT NULL AND price IS NOT NULL"));
        assert!(query.contains("ORDER BY embedding <=> $1::vector"));
        assert!(query.contains("LIMIT $2"));

        let query = nearest_products_query("Product", DistanceMetric::Euclidean);
        assert!(query.contains("ORDER BY embedding <-> $1::vector"));
    }

    #[test]
    fn test_parse_distance_metric() {
        assert_eq!("cosine".parse(), Ok(DistanceMetric::Cosine));
        assert_eq!("L2".parse(), Ok(DistanceMetric::Euclidean));
        assert_eq!("ip".parse(), Ok(DistanceMetric::InnerProduct));
        assert!("manhattan".parse::<DistanceMetric>().is_err());
    }
}
