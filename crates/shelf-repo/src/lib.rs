//! # shelf-repo
//!
//! Storefront repositories over a [`shelf_store::Storer`].
//!
//! | Repository   | Namespace                          |
//! |--------------|------------------------------------|
//! | [`Catalog`]  | `products/<category>/<subcategory>` |
//! | [`Products`] | `products/...#<title>`             |
//! | [`Users`]    | `users#<email>`                    |
//! | [`Tokens`]   | `verifications`, `tokens`          |
//! | [`Blogs`]    | `blogs#<date>:<title>`             |
//! | [`Images`]   | `images/products`, `images/blogs`  |
//!
//! [`Shop`] wires them together over one store and one [`CatalogCache`].
//! The commerce backend, image decoding and password hashing sit behind
//! the traits in [`external`].

pub mod blogs;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod external;
pub mod images;
pub mod products;
pub mod shop;
pub mod tokens;
pub mod users;

#[cfg(test)]
mod fakes;

pub use blogs::Blogs;
pub use cache::{CatalogCache, NavLink};
pub use catalog::{Catalog, PRICE_KEY};
pub use config::{ImageSizes, ShopConfig, TokenTtl};
pub use error::{RepoError, RepoResult};
pub use external::{BcryptHasher, CommerceClient, DecodedImage, ImagePipeline, PasswordHasher};
pub use images::{ImageKind, ImageSize, Images};
pub use products::Products;
pub use shop::Shop;
pub use tokens::{TokenKind, Tokens};
pub use users::Users;
