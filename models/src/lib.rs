// III-IV
// Copyright 2023 Julio Merino
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not
// use this file except in compliance with the License.  You may obtain a copy
// of the License at:
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS, WITHOUT
// WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.  See the
// License for the specific language governing permissions and limitations
// under the License.

//! Business tables of a back-office for invoicing and accounting.
//!
//! The `model` module declares one row type per table (countries, currencies, customers,
//! invoices, accounting entries, roles, ...) along with the validation each row performs on
//! itself.  The `db` module holds the schema, the seed data and the few queries that are not
//! generic CRUD.  The `driver` module wraps everything in single-transaction operations and
//! enforces the business rules that span rows, such as the protection of the system defaults
//! and the uniqueness of default addresses and primary bank accounts.

// Keep these in sync with other top-level files.
#![warn(anonymous_parameters, bad_style, clippy::missing_docs_in_private_items, missing_docs)]
#![warn(unused, unused_extern_crates, unused_import_braces, unused_qualifications)]
#![warn(unsafe_code)]

pub mod db;
pub mod driver;
pub mod model;
