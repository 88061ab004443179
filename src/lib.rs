/*!
# List Sheet

A spreadsheet-style editor for a list of rows kept by a storage backend,
built in Rust.

## Overview

The editor shows a list as a grid: one column per field of the list schema,
one row per list item. Edits made in the grid are collected per row and sent
to the backend as one bulk request when the user saves. New rows can be typed
straight into the grid or submitted through a validated form.

## Architecture

### Client core
- **field / row**: list schema and row values
- **column**: maps each field type to its grid editor, renderer and filter
- **form**: add/edit row form and required-field validation
- **tracker**: pending change set and bulk operation building
- **client**: the `Backend` seam and its HTTP implementation
- **controller**: load, edit, save, refresh, delete, export and search flow

### List server (feature `web`)
- **store**: list provider trait and the in-memory list
- **saving**: gzip-compressed JSON snapshots of a list
- **downloader**: CSV and XLSX export
- **config**: server settings from the environment
- **app**: axum routes

## REST API Endpoints

- `GET /api/fields` - field schema
- `GET /api/data` - rows, with paging, filters and sorting
- `POST /api/item`, `PUT /api/item/{id}`, `DELETE /api/item/{id}` - single rows
- `POST /api/bulk` - batched create/update/delete
- `GET /api/export/{excel|csv}` - download
- `POST /api/search`, `POST /api/validate`
- `GET /health`
*/

pub mod client;
pub mod column;
pub mod controller;
pub mod error;
pub mod field;
pub mod form;
pub mod row;
pub mod tracker;

#[cfg(feature = "web")]
pub mod app;
#[cfg(feature = "web")]
pub mod config;
#[cfg(feature = "web")]
pub mod downloader;
#[cfg(feature = "web")]
pub mod saving;
#[cfg(feature = "web")]
pub mod store;

pub use client::{Backend, DataQuery, ExportFile, ExportFormat, HttpBackend, RowPage, SortOrder};
pub use controller::{GridController, GridRow, LoadState, SaveOutcome};
pub use error::{BulkFailure, Error, Result};
pub use field::{FieldDefinition, FieldType};
pub use row::Row;
pub use tracker::{BulkOperation, ChangeTracker, PendingChange, RowKey};
