/*!
# Sales Dashboard

A sales analytics dashboard over a tabular sales file, built in Rust.

## Overview

The application loads a CSV or Excel sheet of sales records (date, branch,
product, optional seller, amount, target, optional hour) and turns it into
KPIs, compliance figures, rankings and time buckets. The same figures feed a
per-profile view model, a rule-based chat assistant, PDF and Excel exports,
a terminal dashboard and an optional HTTP API.

## Architecture

### Data Layer
- **schema**: Canonical columns and header aliases (Spanish and English)
- **loader**: CSV and Excel parsing into typed records
- **cache**: Memoized datasets keyed by source, explicit reload and upload

### Computation Layer
- **aggregate**: Totals, compliance, grouping, ranking, weekday/month/hour buckets, alerts
- **view**: Immutable view model per profile (General Manager, Sales Director, Marketing Director)
- **chat**: Declarative question to intent table with order-independent resolution

### Presentation Layer
- **graph**: Bar, line and pie charts rendered with plotters
- **report**: PDF summary with embedded charts
- **downloader**: Export functionality (CSV, XLSX)
- **app**: Routing and handlers for the HTTP API

### Support
- **auth**: Face-match gate for the manager view, bounded by a timeout
- **config**: TOML configuration with an embedded default
- **fixtures**: Seeded synthetic datasets
- **error**: Error type and user-facing messages

## Design Highlights

- Every computation is a pure function of the dataset and a selection
- Compliance over a zero target is reported as N/A, never as infinity
- Ties in rankings keep first-appearance order
- Failed uploads keep the previously loaded data

## REST API Endpoints

- `GET /api/view` - View model for a profile and date range
- `GET /api/rank/{dimension}` - Ranking by product, branch or seller
- `POST /api/chat` - Answer a question about the data
- `GET /api/chart/{name}` - PNG chart
- `GET /api/report.pdf`, `GET /api/export.xlsx` - Downloads
- `POST /api/upload`, `POST /api/reload` - Replace or re-read the data
- `POST /api/unlock` - Face-match unlock of the manager view
*/

pub mod aggregate;
pub mod auth;
pub mod cache;
pub mod chat;
pub mod config;
pub mod error;
pub mod fixtures;
pub mod format;
pub mod loader;
pub mod record;
pub mod schema;
pub mod view;

#[cfg(feature = "report")]
pub mod downloader;
#[cfg(feature = "report")]
pub mod graph;
#[cfg(feature = "report")]
pub mod report;

#[cfg(feature = "web")]
pub mod app;

pub use aggregate::{Aggregate, Compliance, GroupTotal, Kpis, RankedEntry};
pub use error::{DashboardError, Result};
pub use record::{DateFilter, Dimension, Measure, SalesDataset, SalesRecord};
pub use view::{Profile, ViewContext, ViewModel};
