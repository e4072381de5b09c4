//! PKI Lifecycle - Multi-tier Certificate Authority Management Library
//!
//! Manages the lifecycle of a three-tier CA hierarchy whose private keys live
//! inside an external signing backend (a Vault-compatible PKI secrets engine).
//! The library never holds a CA key; it drives the backend through namespace
//! setup, cross-signing, issuance, revocation and CRL publication, and keeps
//! operator-facing copies of certificates and leaf credentials on disk.
//!
//! # Overview
//!
//! ```text
//! Root CA        {prefix}/root/{base}/{client}            (self-signed in the backend)
//!   └── Intermediate CA  {prefix}/int/{base}/{client}[/{vendor}]  (CSR cross-signed by Root)
//!       └── Leaf certificate                               (issued under the leaf role)
//! ```
//!
//! # Features
//!
//! - **Deterministic addressing**: every (tier, base, client, vendor) maps to
//!   exactly one backend path
//! - **Policy by construction**: child CA lifetimes default to half the parent's,
//!   leaves are capped by a fixed role policy
//! - **Resumable protocols**: no silent rollback; each failure names the path
//!   and the step that failed
//! - **Idempotent revocation** and bulk cleanup of expired certificates
//! - **Credential export**: encrypted PKCS#8 keys and PKCS#12 bundles
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use pki_lifecycle::backend::SigningBackend;
//! use pki_lifecycle::crypto::{CryptoProvider, OpensslProvider};
//! use pki_lifecycle::hierarchy::{HierarchyRegistry, KeySpec, Namespace, Ttl};
//! use pki_lifecycle::issuance::IssuanceEngine;
//! use pki_lifecycle::memory_backend::MemoryBackend;
//! use pki_lifecycle::requests::SubjectFields;
//!
//! fn main() -> pki_lifecycle::Result<()> {
//!     let backend: Arc<dyn SigningBackend> = Arc::new(MemoryBackend::new());
//!     let crypto: Arc<dyn CryptoProvider> = Arc::new(OpensslProvider::new());
//!     let engine = IssuanceEngine::new(backend, crypto, HierarchyRegistry::new("pki"));
//!
//!     // Root CA, valid 10 years; intermediates may live at most 43800h
//!     let root = engine.create_root_ca(
//!         &Namespace::new("jimsnet", "abc"),
//!         Ttl::hours(87600),
//!         KeySpec::rsa(4096),
//!     )?;
//!
//!     // Intermediate CA for vendor1, cross-signed by the root
//!     let intermediate = engine.create_intermediate_ca(
//!         &root.node.path,
//!         &Namespace::new("jimsnet", "abc").with_vendor("vendor1"),
//!         Ttl::hours(43800),
//!         KeySpec::rsa(4096),
//!     )?;
//!
//!     // Leaf certificate
//!     let leaf = engine.issue_leaf_certificate(
//!         &intermediate.node.path,
//!         engine.registry().leaf_role(),
//!         &SubjectFields::new("bob@example.com").email("bob@example.com"),
//!         Ttl::hours(720),
//!     )?;
//!     println!("Issued serial {}", leaf.record.serial_number);
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! ## [`hierarchy`]
//!
//! Namespace → path resolution, TTL arithmetic, role policies and [`CaNode`]s.
//!
//! ## [`issuance`]
//!
//! The Root, Intermediate and Leaf protocols over a [`SigningBackend`].
//!
//! ## [`ledger`]
//!
//! Lazy serial listings, record lookup, derived status and search.
//!
//! ## [`revocation`]
//!
//! Confirmed revocation, CRL regeneration and expired-certificate cleanup.
//!
//! ## [`credentials`] and [`storage`]
//!
//! The on-disk artifact layout, key encryption and PKCS#12 export.
//!
//! ## [`backend`], [`vault_backend`], [`memory_backend`]
//!
//! The signing backend capability and its two implementations.
//!
//! # Error Handling
//!
//! Every operation returns [`Result<T>`] with a [`PkiError`] that names the
//! path, serial or common name concerned:
//!
//! ```no_run
//! use pki_lifecycle::PkiError;
//! # fn example(engine: &pki_lifecycle::issuance::IssuanceEngine) {
//! # let ns = pki_lifecycle::hierarchy::Namespace::new("jimsnet", "abc");
//! # let ttl = pki_lifecycle::hierarchy::Ttl::hours(87600);
//! match engine.create_root_ca(&ns, ttl, Default::default()) {
//!     Ok(root) => println!("created {}", root.node.path),
//!     Err(PkiError::AlreadyExists { path }) => println!("{} is already set up", path),
//!     Err(PkiError::StepFailed { path, step, .. }) => {
//!         println!("{} stopped at '{}'; finish or remove it by hand", path, step)
//!     }
//!     Err(e) => println!("error: {}", e),
//! }
//! # }
//! ```

pub mod backend;
pub mod certificate_builder;
pub mod configs;
pub mod credentials;
pub mod crypto;
pub mod error;
pub mod hierarchy;
pub mod issuance;
pub mod key_material;
pub mod ledger;
pub mod memory_backend;
pub mod requests;
pub mod revocation;
pub mod storage;
pub mod vault_backend;

pub use backend::SigningBackend;
pub use error::{BackendError, IssuanceStep, PkiError, Result};
pub use hierarchy::{CaNode, HierarchyRegistry, Namespace, Tier, Ttl};
