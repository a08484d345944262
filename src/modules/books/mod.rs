pub mod error;
pub mod lending;
pub mod models;
pub mod routes;
pub mod store;

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use libris_kernel::{InitCtx, Migration, Module};
use serde_json::json;

use store::SharedStore;

/// Book catalog and lending
pub struct BooksModule {
    store: SharedStore,
}

impl BooksModule {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Module for BooksModule {
    fn name(&self) -> &'static str {
        "books"
    }

    async fn init(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(
            module = self.name(),
            environment = ctx.settings.environment.as_str(),
            "books module initialized"
        );
        Ok(())
    }

    fn routes(&self) -> Router {
        routes::router(Arc::clone(&self.store))
    }

    fn openapi(&self) -> Option<serde_json::Value> {
        Some(openapi_fragment())
    }

    fn migrations(&self) -> Vec<Migration> {
        vec![Migration {
            id: "001_create_books",
            up: r#"
                CREATE TABLE IF NOT EXISTS books (
                    serial_number        VARCHAR(6)   PRIMARY KEY,
                    title                VARCHAR(300) NOT NULL,
                    author               VARCHAR(200) NOT NULL,
                    status               VARCHAR(10)  NOT NULL DEFAULT 'AVAILABLE',
                    borrowed_at          TIMESTAMPTZ  NULL,
                    borrower_card_number VARCHAR(6)   NULL,
                    CONSTRAINT ck_books_status
                        CHECK (status IN ('AVAILABLE', 'BORROWED')),
                    CONSTRAINT ck_books_available_fields
                        CHECK (status <> 'AVAILABLE'
                               OR (borrowed_at IS NULL AND borrower_card_number IS NULL)),
                    CONSTRAINT ck_books_borrowed_fields
                        CHECK (status <> 'BORROWED'
                               OR (borrowed_at IS NOT NULL AND borrower_card_number IS NOT NULL))
                );
                CREATE INDEX IF NOT EXISTS books_status_idx ON books (status);
                "#,
        }]
    }

    async fn start(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(module = self.name(), "books module started");
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        tracing::info!(module = self.name(), "books module stopped");
        Ok(())
    }
}

fn error_response(description: &str) -> serde_json::Value {
    json!({
        "description": description,
        "content": {
            "application/json": {
                "schema": { "$ref": "#/components/schemas/ErrorResponse" }
            }
        }
    })
}

fn book_response(description: &str) -> serde_json::Value {
    json!({
        "description": description,
        "content": {
            "application/json": {
                "schema": { "$ref": "#/components/schemas/Book" }
            }
        }
    })
}

fn serial_parameter() -> serde_json::Value {
    json!({
        "name": "serial_number",
        "in": "path",
        "required": true,
        "schema": { "type": "string", "example": "000001" }
    })
}

fn openapi_fragment() -> serde_json::Value {
    json!({
        "paths": {
            "/": {
                "get": {
                    "summary": "List books",
                    "tags": ["books"],
                    "parameters": [{
                        "name": "status",
                        "in": "query",
                        "required": false,
                        "schema": { "$ref": "#/components/schemas/BookStatus" }
                    }],
                    "responses": {
                        "200": {
                            "description": "Books ordered by serial number",
                            "content": {
                                "application/json": {
                                    "schema": {
                                        "type": "array",
                                        "items": { "$ref": "#/components/schemas/Book" }
                                    }
                                }
                            }
                        },
                        "422": error_response("Unknown status filter")
                    }
                },
                "post": {
                    "summary": "Create a book",
                    "tags": ["books"],
                    "requestBody": {
                        "required": true,
                        "content": {
                            "application/json": {
                                "schema": { "$ref": "#/components/schemas/CreateBook" }
                            }
                        }
                    },
                    "responses": {
                        "201": book_response("Created"),
                        "409": error_response("Serial number already exists"),
                        "422": error_response("Validation error")
                    }
                }
            },
            "/{serial_number}": {
                "delete": {
                    "summary": "Delete a book",
                    "tags": ["books"],
                    "parameters": [serial_parameter()],
                    "responses": {
                        "204": { "description": "Deleted" },
                        "404": error_response("Book not found")
                    }
                }
            },
            "/{serial_number}/borrow": {
                "patch": {
                    "summary": "Borrow a book",
                    "tags": ["books"],
                    "parameters": [serial_parameter()],
                    "requestBody": {
                        "required": true,
                        "content": {
                            "application/json": {
                                "schema": { "$ref": "#/components/schemas/BorrowRequest" }
                            }
                        }
                    },
                    "responses": {
                        "200": book_response("Borrowed"),
                        "404": error_response("Book not found"),
                        "409": error_response("Book is already borrowed"),
                        "422": error_response("Validation error")
                    }
                }
            },
            "/{serial_number}/return": {
                "patch": {
                    "summary": "Return a book",
                    "tags": ["books"],
                    "parameters": [serial_parameter()],
                    "responses": {
                        "200": book_response("Returned"),
                        "404": error_response("Book not found"),
                        "409": error_response("Book is not currently borrowed")
                    }
                }
            }
        },
        "components": {
            "schemas": {
                "BookStatus": {
                    "type": "string",
                    "enum": ["AVAILABLE", "BORROWED"]
                },
                "Book": {
                    "type": "object",
                    "properties": {
                        "serial_number": { "type": "string", "pattern": "^[0-9]{6}$" },
                        "title": { "type": "string" },
                        "author": { "type": "string" },
                        "status": { "$ref": "#/components/schemas/BookStatus" },
                        "borrowed_at": { "type": "string", "format": "date-time", "nullable": true },
                        "borrower_card_number": { "type": "string", "nullable": true }
                    },
                    "required": [
                        "serial_number", "title", "author", "status",
                        "borrowed_at", "borrower_card_number"
                    ]
                },
                "CreateBook": {
                    "type": "object",
                    "properties": {
                        "serial_number": { "type": "string", "pattern": "^[0-9]{6}$", "example": "000001" },
                        "title": { "type": "string", "minLength": 1, "maxLength": 300 },
                        "author": { "type": "string", "minLength": 1, "maxLength": 200 }
                    },
                    "required": ["serial_number", "title", "author"]
                },
                "BorrowRequest": {
                    "type": "object",
                    "properties": {
                        "borrower_card_number": { "type": "string", "pattern": "^[0-9]{6}$", "example": "100001" }
                    },
                    "required": ["borrower_card_number"]
                }
            }
        }
    })
}

/// Create a new instance of the books module
pub fn create_module(store: SharedStore) -> Arc<dyn Module> {
    Arc::new(BooksModule::new(store))
}
