use crate::auth::AuthenticatedCaller;
use crate::error::Result;
use actix_web::{delete, get, post, put, web, HttpResponse, Responder};
use base64::Engine;
use logcar_core::record::{ReadOpts, WriteOpts};
use logcar_core::{LogCar, Rid};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

/// Per-request overrides accepted alongside the JSON body: an explicit
/// encryption key for this one write/read (spec §4.7's `opts.key`), and for
/// reads, whether an incomplete fragment group should fail hard instead of
/// coming back as a tolerant `_incomplete:true` sentinel (spec §7).
#[derive(Deserialize, Default)]
pub struct KeyQuery {
    key: Option<String>,
    #[serde(default)]
    strict: bool,
}

#[put("/records")]
pub async fn create_record(
    _caller: AuthenticatedCaller,
    car: web::Data<Arc<LogCar>>,
    opts: web::Query<KeyQuery>,
    body: web::Json<Value>,
) -> Result<impl Responder> {
    let record = car.create(body.into_inner(), WriteOpts { key: opts.key.clone() })?;
    Ok(HttpResponse::Created().json(json! {{
        "success": true,
        "rid": record.rid,
        "value": record.value,
    }}))
}

#[get("/records/{rid}")]
pub async fn read_record(
    _caller: AuthenticatedCaller,
    rid: web::Path<Rid>,
    car: web::Data<Arc<LogCar>>,
    opts: web::Query<KeyQuery>,
) -> Result<impl Responder> {
    let record = car.read(rid.into_inner(), ReadOpts { key: opts.key.clone(), strict: opts.strict }).await?;
    Ok(match record {
        Some(record) => HttpResponse::Ok().json(json! {{
            "success": true,
            "rid": record.rid,
            "value": record.value,
            "_incomplete": record.incomplete,
        }}),
        None => HttpResponse::NotFound().json(json! {{
            "success": false,
            "error": "no such record",
        }}),
    })
}

#[post("/records/{rid}")]
pub async fn update_record(
    _caller: AuthenticatedCaller,
    rid: web::Path<Rid>,
    car: web::Data<Arc<LogCar>>,
    opts: web::Query<KeyQuery>,
    body: web::Json<Value>,
) -> Result<impl Responder> {
    let record = car.update(rid.into_inner(), body.into_inner(), WriteOpts { key: opts.key.clone() })?;
    Ok(HttpResponse::Ok().json(json! {{
        "success": true,
        "rid": record.rid,
        "value": record.value,
    }}))
}

#[delete("/records/{rid}")]
pub async fn delete_record(_caller: AuthenticatedCaller, rid: web::Path<Rid>, car: web::Data<Arc<LogCar>>) -> Result<impl Responder> {
    car.delete(rid.into_inner())?;
    Ok(HttpResponse::Ok().json(json! {{
        "success": true,
    }}))
}

/// Uploads a file as the body of the request. Base64-encodes it and runs it
/// through the ordinary create path (spec.md §1's "file upload" is just a
/// large string leaf to C2 — see SPEC_FULL.md §4 for why this crate doesn't
/// pull in a multipart parser for one endpoint).
#[put("/records/{rid}/file")]
pub async fn upload_file(
    _caller: AuthenticatedCaller,
    rid: web::Path<Rid>,
    car: web::Data<Arc<LogCar>>,
    opts: web::Query<KeyQuery>,
    body: web::Bytes,
) -> Result<impl Responder> {
    let encoded = base64::engine::general_purpose::STANDARD.encode(&body);
    let record = car.update(rid.into_inner(), Value::String(encoded), WriteOpts { key: opts.key.clone() })?;
    Ok(HttpResponse::Ok().json(json! {{
        "success": true,
        "rid": record.rid,
        "bytes": body.len(),
    }}))
}

#[get("/records/{rid}/file")]
pub async fn download_file(
    _caller: AuthenticatedCaller,
    rid: web::Path<Rid>,
    car: web::Data<Arc<LogCar>>,
    opts: web::Query<KeyQuery>,
) -> Result<impl Responder> {
    let record = car.read(rid.into_inner(), ReadOpts { key: opts.key.clone(), strict: opts.strict }).await?;
    let Some(record) = record else {
        return Ok(HttpResponse::NotFound().json(json! {{
            "success": false,
            "error": "no such record",
        }}));
    };

    let Some(encoded) = record.value.as_str() else {
        return Ok(HttpResponse::UnprocessableEntity().json(json! {{
            "success": false,
            "error": "record is not a file",
        }}));
    };

    let bytes = base64::engine::general_purpose::STANDARD.decode(encoded)?;
    Ok(HttpResponse::Ok().content_type("application/octet-stream").body(bytes))
}
