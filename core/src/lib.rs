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

//! Core abstractions to build the data layer of a business back-office.
//!
//! Applications built on top of this crate adhere to the following layered architecture, and they
//! should structure their code to have these modules as well:
//!
//! 1.  `model`: This is the base layer, providing the plain data types that mirror the rows of the
//!     database tables.  There should be no logic in here other than the validation and
//!     sanitization that each record performs on itself before being persisted.
//!
//! 1.  `db`: This is the persistence layer.  Every table row type implements the `Record` and
//!     `Table` traits, which plug it into the generic CRUD operations offered by `db::table`.
//!     Read-only aggregations implement `View` instead.
//!
//! 1.  `driver`: This is the business logic layer.  Applications provide their own `Driver` type
//!     to encapsulate all of the in-memory state required by the app (caches, clocks,
//!     configuration) and to coordinate access to the database inside transactions.
//!
//! There are result and error types in every layer, such as `DbResult` and `DbError`.  Errors can
//! transparently float to the top of the app using the `?` operator.

// Keep these in sync with other top-level files.
#![warn(anonymous_parameters, bad_style, clippy::missing_docs_in_private_items, missing_docs)]
#![warn(unused, unused_extern_crates, unused_import_braces, unused_qualifications)]
#![warn(unsafe_code)]

pub mod clocks;
pub mod db;
pub mod driver;
pub mod env;
pub mod model;
