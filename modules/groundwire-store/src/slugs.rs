//! Dynamic slug reads and writes. Lookups are case-insensitive; the search
//! escalates through three strategies when a query keeps failing
//! transiently: wildcard, prefix, then exact.

use groundwire_common::DynamicSlug;
use tracing::warn;

use crate::db::Db;
use crate::error::Result;
use crate::rows::SlugRow;

/// Escape `%` and `_` so a search term can't act as its own wildcard.
fn escape_like(term: &str) -> String {
    term.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

impl Db {
    pub async fn all_slugs(&self) -> Result<Vec<DynamicSlug>> {
        let rows = self
            .run("load all slugs", || {
                sqlx::query_as::<_, SlugRow>(
                    "SELECT parent_tag, slug_identifier, full_slug FROM dynamic_slugs",
                )
                .fetch_all(self.pool())
            })
            .await?
            .unwrap_or_default();
        Ok(rows.into_iter().map(DynamicSlug::from).collect())
    }

    /// ILIKE search over slug identifiers. Each transient failure falls
    /// back to a simpler pattern; a final failure returns an empty result
    /// rather than surfacing, because slug search is advisory context for
    /// the model.
    pub async fn search_slugs(
        &self,
        search_term: &str,
        parent_tag_filter: Option<&str>,
    ) -> Result<Vec<DynamicSlug>> {
        let escaped = escape_like(search_term);
        let patterns = [
            format!("%{escaped}%"),
            format!("{escaped}%"),
            escaped.clone(),
        ];

        for (strategy, pattern) in patterns.iter().enumerate() {
            let attempt = self
                .run("search dynamic slugs", || {
                    sqlx::query_as::<_, SlugRow>(
                        "SELECT parent_tag, slug_identifier, full_slug FROM dynamic_slugs \
                         WHERE slug_identifier ILIKE $1 \
                           AND ($2::text IS NULL OR parent_tag = $2)",
                    )
                    .bind(pattern)
                    .bind(parent_tag_filter)
                    .fetch_all(self.pool())
                })
                .await;

            match attempt {
                Ok(rows) => {
                    return Ok(rows
                        .unwrap_or_default()
                        .into_iter()
                        .map(DynamicSlug::from)
                        .collect())
                }
                Err(e) if strategy + 1 < patterns.len() => {
                    warn!(search_term, strategy, error = %e, "slug search failed, trying simpler pattern");
                }
                Err(e) => {
                    warn!(search_term, error = %e, "slug search failed on all strategies");
                    return Ok(Vec::new());
                }
            }
        }

        Ok(Vec::new())
    }

    /// Persist a newly minted slug; conflicts on an existing `full_slug`
    /// (case-insensitive) are no-ops.
    pub async fn upsert_slug(&self, slug: &DynamicSlug) -> Result<()> {
        self.run("upsert dynamic slug", || {
            sqlx::query(
                "INSERT INTO dynamic_slugs (parent_tag, slug_identifier, full_slug) \
                 VALUES ($1, $2, $3) \
                 ON CONFLICT (lower(full_slug)) DO NOTHING",
            )
            .bind(&slug.parent_tag)
            .bind(&slug.slug_identifier)
            .bind(&slug.full_slug)
            .execute(self.pool())
        })
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_escaping() {
        assert_eq!(escape_like("100%_done"), "100\\%\\_done");
        assert_eq!(escape_like("plain"), "plain");
    }
}
