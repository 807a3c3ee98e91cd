use std::sync::Arc;

use axum::{routing::get, Json, Router};
use serde_json::{json, Map, Value};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::authz::{EffectiveGrants, GrantLevel};
use crate::dispatch::{ResourceAction, ResourceDescriptor, ResourceRegistry, RouteBinding};
use crate::envelope::{EnvelopeBody, ErrorEnvelope};
use crate::models::user::{AuthResponse, LoginRequest, MeResponse, User};
use crate::reports::csv_view::IssuedLink;
use crate::reports::ReportSummary;
use crate::routes::health::HealthResponse;
use crate::services::schema::View;

#[derive(OpenApi)]
#[openapi(
	paths(
		crate::routes::health::health,
		crate::routes::auth::login,
		crate::routes::auth::me,
		crate::reports::handlers::report_list,
		crate::reports::handlers::report,
		crate::reports::handlers::csv_link,
		crate::reports::handlers::report_csv_view
	),
	components(
		schemas(
			EnvelopeBody,
			ErrorEnvelope,
			User,
			LoginRequest,
			AuthResponse,
			MeResponse,
			EffectiveGrants,
			GrantLevel,
			HealthResponse,
			ReportSummary,
			IssuedLink
		)
	),
	tags(
		(name = "Health", description = "Liveness and database probe"),
		(name = "Auth", description = "Authentication endpoints"),
		(name = "Reports", description = "Report catalogue, rendering and CSV links")
	)
)]
pub struct ApiDoc;

/// Annotated routes plus one synthesized operation per resource binding.
///
/// Kept as JSON: the synthesized operations carry `x-` extensions that the
/// typed document would drop.
pub fn build_openapi(registry: &ResourceRegistry, port: u16) -> anyhow::Result<Value> {
	let mut doc = serde_json::to_value(ApiDoc::openapi())?;

	add_resource_paths(&mut doc, registry);
	ensure_security_components(&mut doc);
	ensure_servers(&mut doc, port);

	Ok(doc)
}

pub fn swagger_routes(doc: Value) -> Router {
	let swagger_config = utoipa_swagger_ui::Config::new(["/api-docs/openapi.json"])
		.try_it_out_enabled(true)
		.with_credentials(true)
		.persist_authorization(true);

	let doc_json = Arc::new(doc);

	let json_route = get(move || {
		let doc_json = Arc::clone(&doc_json);
		async move { Json((*doc_json).clone()) }
	});

	Router::new()
		.route("/api-docs/openapi.json", json_route)
		.merge(SwaggerUi::new("/docs").config(swagger_config))
}

fn object_entry<'a>(parent: &'a mut Value, key: &str) -> Option<&'a mut Map<String, Value>> {
	parent
		.as_object_mut()?
		.entry(key.to_string())
		.or_insert_with(|| Value::Object(Map::new()))
		.as_object_mut()
}

fn add_resource_paths(doc: &mut Value, registry: &ResourceRegistry) {
	let Some(paths) = object_entry(doc, "paths") else {
		return;
	};

	for resource in registry.iter() {
		for binding in resource.bindings() {
			let operation = resource_operation(resource, &binding);
			let method = binding.method.as_str().to_ascii_lowercase();
			let entry = paths
				.entry(binding.openapi_path())
				.or_insert_with(|| Value::Object(Map::new()));
			if let Some(item) = entry.as_object_mut() {
				item.insert(method, operation);
			}
		}
	}
}

fn error_response(description: &str) -> Value {
	json!({
		"description": description,
		"content": {"application/json": {"schema": {"$ref": "#/components/schemas/ErrorEnvelope"}}}
	})
}

fn envelope_response(description: &str) -> Value {
	json!({
		"description": description,
		"content": {"application/json": {"schema": {"$ref": "#/components/schemas/EnvelopeBody"}}}
	})
}

fn list_parameters(resource: &ResourceDescriptor, view: View) -> Vec<Value> {
	let mut params = vec![
		json!({"name": "page", "in": "query", "required": false, "schema": {"type": "integer", "minimum": 1}}),
		json!({"name": "limit", "in": "query", "required": false, "schema": {"type": "integer", "minimum": 1}}),
		json!({"name": "sort", "in": "query", "required": false, "schema": {"type": "string"}}),
		json!({"name": "order", "in": "query", "required": false, "schema": {"type": "string", "enum": ["asc", "desc"]}}),
		json!({"name": "format", "in": "query", "required": false, "schema": {"type": "string", "enum": ["json", "csv"]}}),
	];
	for column in resource.schema().view_columns(view).filter(|c| c.filterable) {
		params.push(json!({
			"name": format!("filter[{}]", column.name),
			"in": "query",
			"required": false,
			"schema": {"type": "string"}
		}));
	}
	params
}

fn resource_operation(resource: &ResourceDescriptor, binding: &RouteBinding) -> Value {
	let tag = resource.name;
	let id_param = json!({"name": "id", "in": "path", "required": true, "schema": {"type": "integer", "minimum": 0}});
	let ids_body = json!({
		"required": true,
		"content": {"application/json": {"schema": {"type": "array", "items": {"oneOf": [{"type": "integer"}, {"type": "string", "pattern": "^[0-9]+$"}]}}}}
	});
	let fields_body = json!({
		"required": true,
		"content": {"application/json": {"schema": {"type": "object"}}}
	});

	let mut operation = json!({
		"tags": [tag],
		"operationId": format!("{}_{}", tag.replace('-', "_"), binding.action.to_string().to_ascii_lowercase()),
		"security": [{"bearerAuth": []}],
	});
	let (summary, responses, parameters, body) = match binding.action {
		ResourceAction::Grid => (
			"Paginated grid",
			json!({"200": envelope_response("Grid page or CSV file")}),
			list_parameters(resource, View::Grid),
			None,
		),
		ResourceAction::GridOptions => (
			"Column metadata",
			json!({"200": envelope_response("Columns of the requested group")}),
			vec![json!({"name": "group", "in": "query", "required": false, "schema": {"type": "string", "enum": ["grid", "list", "get"]}})],
			None,
		),
		ResourceAction::List => (
			"List",
			json!({"200": envelope_response("Rows or CSV file")}),
			list_parameters(resource, View::List),
			None,
		),
		ResourceAction::Get => (
			"Fetch one",
			json!({"200": envelope_response("Entity"), "404": error_response("Not found (code 624)")}),
			vec![id_param],
			None,
		),
		ResourceAction::Add => (
			"Create",
			json!({"201": envelope_response("Array holding the new id"), "400": error_response("Validation failed (code 600)")}),
			vec![],
			Some(fields_body),
		),
		ResourceAction::Edit => (
			"Update",
			json!({"201": {"description": "Updated"}, "400": error_response("Validation failed (code 600)"), "404": error_response("Not found (code 624)")}),
			vec![id_param],
			Some(fields_body),
		),
		ResourceAction::Delete => (
			"Delete one",
			json!({"204": {"description": "Deleted"}, "404": error_response("Not found (code 624)")}),
			vec![id_param],
			None,
		),
		ResourceAction::DeleteBulk => (
			"Delete many (all or nothing)",
			json!({"204": {"description": "Deleted"}, "400": error_response("Malformed id (code 600)"), "404": error_response("Unknown id (code 624)")}),
			vec![],
			Some(ids_body),
		),
		ResourceAction::RelatedInfo => (
			"References to the given ids",
			json!({"200": envelope_response("Aggregated reference info"), "400": error_response("Malformed id (code 600)")}),
			vec![],
			Some(ids_body),
		),
		ResourceAction::Report | ResourceAction::ReportCsvView => ("", json!({}), vec![], None),
	};

	if let Some(object) = operation.as_object_mut() {
		object.insert("summary".into(), json!(format!("{summary} ({tag})")));
		let mut responses = responses;
		if let Some(map) = responses.as_object_mut() {
			map.insert("401".into(), error_response("Unauthenticated (code 610)"));
			if binding.required_grant.is_some() {
				map.insert("403".into(), error_response("Missing grant (code 611)"));
			}
		}
		object.insert("responses".into(), responses);
		if !parameters.is_empty() {
			object.insert("parameters".into(), Value::Array(parameters));
		}
		if let Some(body) = body {
			object.insert("requestBody".into(), body);
		}
		if let Some(grant) = &binding.required_grant {
			object.insert("x-required-grant".into(), json!(grant.to_string()));
		}
	}

	operation
}

fn ensure_security_components(doc: &mut Value) {
	let Some(components) = object_entry(doc, "components") else {
		return;
	};
	let schemes = components
		.entry("securitySchemes")
		.or_insert_with(|| Value::Object(Map::new()));
	if let Some(schemes) = schemes.as_object_mut() {
		schemes.entry("bearerAuth").or_insert_with(|| {
			json!({"type": "http", "scheme": "bearer", "bearerFormat": "JWT"})
		});
	}
}

fn ensure_servers(doc: &mut Value, port: u16) {
	if let Some(root) = doc.as_object_mut() {
		root.entry("servers")
			.or_insert_with(|| json!([{"url": format!("http://localhost:{port}"), "description": "Local server"}]));
	}
}
