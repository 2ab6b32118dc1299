//! Integration tests for ctas-athena.
//!
//! The lifecycle runs against in-memory S3 (`object_store::memory`), an
//! in-memory catalog and a scripted engine, so no AWS credentials are needed.

mod support;

mod cleanup;
mod validation;
