//! FromRow trait for row-to-struct mapping.
//!
//! Implement [`FromRow`] by hand for structs, or use the tuple impls for
//! ad-hoc projections:
//!
//! ```rust,ignore
//! let pairs: Vec<(i32, String)> = client
//!     .query_as("SELECT id, name FROM users", &[])
//!     .await?;
//! ```

use lambda_pg_types::{FromValue, QueryResult, Row};

use crate::error::Error;

/// Trait for types that can be constructed from a database row.
///
/// # Example
///
/// ```rust,ignore
/// use lambda_pg_client::{Error, FromRow};
/// use lambda_pg_types::Row;
///
/// struct User {
///     id: i32,
///     name: String,
/// }
///
/// impl FromRow for User {
///     fn from_row(row: &Row) -> Result<Self, Error> {
///         Ok(Self {
///             id: row.get("id")?,
///             name: row.get("name")?,
///         })
///     }
/// }
/// ```
pub trait FromRow: Sized {
    /// Construct an instance of this type from a database row.
    ///
    /// # Errors
    ///
    /// Returns an error if a required column is missing or a value cannot be
    /// converted to the expected Rust type.
    fn from_row(row: &Row) -> Result<Self, Error>;
}

macro_rules! impl_from_row_tuple {
    ($($idx:tt => $t:ident),+) => {
        impl<$($t: FromValue),+> FromRow for ($($t,)+) {
            fn from_row(row: &Row) -> Result<Self, Error> {
                Ok(($(row.get::<$t>($idx)?,)+))
            }
        }
    };
}

impl_from_row_tuple!(0 => A);
impl_from_row_tuple!(0 => A, 1 => B);
impl_from_row_tuple!(0 => A, 1 => B, 2 => C);
impl_from_row_tuple!(0 => A, 1 => B, 2 => C, 3 => D);

/// Map every row of a result.
pub fn map_rows<T: FromRow>(result: &QueryResult) -> Result<Vec<T>, Error> {
    result.rows().iter().map(T::from_row).collect()
}
