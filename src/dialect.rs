//! Per-dialect placeholder and quoting conventions (§4.6), behind this
//! crate's `postgres`/`mysql`/`mssql` Cargo features.
//!
//! Grounded directly on the teacher's per-DBMS `Settings` const structs
//! (`src/dbms/{postgres,mysql,mssql}/mod.rs`), which hold exactly this kind
//! of dialect-constant data (placeholder style, identifier quoting).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    #[cfg(feature = "postgres")]
    Postgres,
    #[cfg(feature = "mysql")]
    MySql,
    #[cfg(feature = "mssql")]
    MsSql,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// `$1`, `$2`, ... (Postgres).
    Numbered,
    /// `?` repeated positionally (MySQL).
    Positional,
    /// `@p1`, `@p2`, ... (MSSQL/Tiberius).
    Named,
}

pub struct Settings {
    pub placeholder_style: PlaceholderStyle,
    pub identifier_quote: char,
}

impl Dialect {
    /// Maps a connected pool's sniffed driver kind onto the dialect whose
    /// placeholder/quoting conventions apply to it.
    ///
    /// # Errors
    /// Returns [`crate::error::Error::Configuration`] if the pool connected
    /// to a driver this build has no matching Cargo feature enabled for.
    pub fn from_any_kind(kind: sqlx_oldapi::any::AnyKind) -> crate::error::Result<Self> {
        match kind {
            #[cfg(feature = "postgres")]
            sqlx_oldapi::any::AnyKind::Postgres => Ok(Dialect::Postgres),
            #[cfg(feature = "mysql")]
            sqlx_oldapi::any::AnyKind::MySql => Ok(Dialect::MySql),
            #[cfg(feature = "mssql")]
            sqlx_oldapi::any::AnyKind::Mssql => Ok(Dialect::MsSql),
            other => Err(crate::error::Error::configuration(
                "database_url",
                format!("no dialect support compiled in for {other:?}"),
            )),
        }
    }

    #[must_use]
    pub fn settings(self) -> Settings {
        match self {
            #[cfg(feature = "postgres")]
            Dialect::Postgres => Settings {
                placeholder_style: PlaceholderStyle::Numbered,
                identifier_quote: '"',
            },
            #[cfg(feature = "mysql")]
            Dialect::MySql => Settings {
                placeholder_style: PlaceholderStyle::Positional,
                identifier_quote: '`',
            },
            #[cfg(feature = "mssql")]
            Dialect::MsSql => Settings {
                placeholder_style: PlaceholderStyle::Named,
                identifier_quote: '"',
            },
        }
    }

    /// Rewrites a `:name` neutral marker sequence (as produced by
    /// `sql::DynamicContext`) into this dialect's positional placeholder
    /// syntax, in marker order. Leaves `::` type casts and anything inside a
    /// `'...'`/`"..."` string literal alone (§8 invariant 1: the placeholder
    /// count must match the mapping count, not every lone `:`).
    #[must_use]
    pub fn rewrite_markers(self, sql: &str) -> String {
        let settings = self.settings();
        let mut out = String::with_capacity(sql.len());
        let mut index = 0usize;
        let mut in_string: Option<char> = None;
        let mut chars = sql.char_indices().peekable();
        while let Some((i, c)) = chars.next() {
            if let Some(quote) = in_string {
                out.push(c);
                if c == quote {
                    in_string = None;
                }
                continue;
            }
            if c == '\'' || c == '"' {
                in_string = Some(c);
                out.push(c);
                continue;
            }
            if c == ':' && sql[i + 1..].starts_with(':') {
                // A `::` cast, not a marker start; pass both colons through.
                out.push(':');
                out.push(':');
                chars.next();
                continue;
            }
            if c == ':' && sql[i + 1..].starts_with(|c: char| c.is_alphabetic() || c == '_') {
                let start = i + 1;
                let mut end = start;
                for (j, cc) in sql[start..].char_indices() {
                    if cc.is_alphanumeric() || cc == '_' {
                        end = start + j + cc.len_utf8();
                    } else {
                        break;
                    }
                }
                index += 1;
                match settings.placeholder_style {
                    PlaceholderStyle::Numbered => out.push_str(&format!("${index}")),
                    PlaceholderStyle::Positional => out.push('?'),
                    PlaceholderStyle::Named => out.push_str(&format!("@p{index}")),
                }
                while chars.peek().is_some_and(|&(p, _)| p < end) {
                    chars.next();
                }
                continue;
            }
            out.push(c);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(feature = "postgres")]
    #[test]
    fn postgres_rewrites_to_numbered_markers() {
        let sql = "SELECT * FROM t WHERE a = :a AND b = :b";
        assert_eq!(
            Dialect::Postgres.rewrite_markers(sql),
            "SELECT * FROM t WHERE a = $1 AND b = $2"
        );
    }

    #[cfg(feature = "mysql")]
    #[test]
    fn mysql_rewrites_to_positional_markers() {
        let sql = "SELECT * FROM t WHERE a = :a AND b = :b";
        assert_eq!(
            Dialect::MySql.rewrite_markers(sql),
            "SELECT * FROM t WHERE a = ? AND b = ?"
        );
    }

    #[cfg(feature = "postgres")]
    #[test]
    fn postgres_leaves_double_colon_casts_alone() {
        let sql = "SELECT price::numeric FROM t WHERE a = :a";
        assert_eq!(
            Dialect::Postgres.rewrite_markers(sql),
            "SELECT price::numeric FROM t WHERE a = $1"
        );
    }

    #[cfg(feature = "postgres")]
    #[test]
    fn postgres_ignores_markers_inside_string_literals() {
        let sql = "SELECT * FROM t WHERE label = 'not:a:marker' AND a = :a";
        assert_eq!(
            Dialect::Postgres.rewrite_markers(sql),
            "SELECT * FROM t WHERE label = 'not:a:marker' AND a = $1"
        );
    }
}
