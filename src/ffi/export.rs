// FFI bindings for the `ExportService`.
//
// Every function decodes its C-string arguments, forwards to the service on the
// shared runtime and writes JSON into `*result`. Strings returned through
// `result` are owned by the caller and must be released with `csv_export_free`.

use std::ffi::{c_char, CString};
use std::os::raw::c_int;
use std::path::PathBuf;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::config::ExportConfig;
use crate::domains::export::service::ExportService;
use crate::domains::export::streamer::suggested_filename;
use crate::domains::export::types::{ExportJobResponse, ExportRequest, ExportStats};
use crate::errors::DomainError;
use crate::ffi::error::{ErrorCode, FFIError, FFIResult};
use crate::ffi::{block_on_async, handle_status_result, read_c_str, to_json_c_string};

fn parse_job_id(raw: &str) -> FFIResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| FFIError::new(ErrorCode::InvalidUuid, &format!("Invalid job ID: {}", raw)))
}

fn check_result_ptr(result: *mut *mut c_char) -> FFIResult<()> {
    if result.is_null() {
        return Err(FFIError::new(ErrorCode::NullPointer, "result is null"));
    }
    Ok(())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DownloadResponse {
    file_name: String,
    path: String,
    #[serde(flatten)]
    stats: ExportStats,
}

/// Initialize the engine.
///
/// `config_json` may be null, in which case configuration is read from the
/// `CSV_EXPORT_*` environment variables.
///
/// # Safety
/// `config_json` must be null or a valid NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn csv_export_initialize(config_json: *const c_char) -> c_int {
    handle_status_result(|| unsafe {
        let config = if config_json.is_null() {
            ExportConfig::from_env()?
        } else {
            let raw = read_c_str(config_json, "config_json")?;
            serde_json::from_str::<ExportConfig>(raw)
                .map_err(|e| FFIError::invalid_argument(&format!("Invalid config JSON: {}", e)))?
        };
        block_on_async(async { Ok::<_, FFIError>(crate::globals::initialize(config).await?) })
    })
}

/// Fields available for an entity type, as `FieldCatalog` JSON.
///
/// # Safety
/// Pointers must be valid; `result` receives a string owned by the caller.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn csv_export_get_field_catalog(
    entity_type: *const c_char,
    result: *mut *mut c_char,
) -> c_int {
    handle_status_result(|| unsafe {
        check_result_ptr(result)?;
        let entity_type = read_c_str(entity_type, "entity_type")?;

        let service = crate::globals::get_export_service()?;
        let catalog = block_on_async(async { Ok::<_, FFIError>(service.get_field_catalog(entity_type).await?) })?;
        *result = to_json_c_string(&catalog)?;
        Ok(())
    })
}

/// A few distinct sample values for a `default.`/`custom.`/`tag.` field, as a JSON array.
///
/// # Safety
/// Pointers must be valid; `result` receives a string owned by the caller.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn csv_export_get_example_values(
    entity_type: *const c_char,
    field: *const c_char,
    result: *mut *mut c_char,
) -> c_int {
    handle_status_result(|| unsafe {
        check_result_ptr(result)?;
        let entity_type = read_c_str(entity_type, "entity_type")?;
        let field = read_c_str(field, "field")?;

        let service = crate::globals::get_export_service()?;
        let values = block_on_async(async { Ok::<_, FFIError>(service.get_example_values(entity_type, field).await?) })?;
        *result = to_json_c_string(&values)?;
        Ok(())
    })
}

/// Submit an export request. Writes `{"jobId": "..."}` once the batch is dispatched.
///
/// # Safety
/// Pointers must be valid; `result` receives a string owned by the caller.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn csv_export_submit(
    request_json: *const c_char,
    owner_id: i64,
    result: *mut *mut c_char,
) -> c_int {
    handle_status_result(|| unsafe {
        check_result_ptr(result)?;
        let request = ExportRequest::from_json(read_c_str(request_json, "request_json")?)?;

        let service = crate::globals::get_export_service()?;
        let job_id = block_on_async(async { Ok::<_, FFIError>(service.submit_request(request, owner_id).await?) })?;
        *result = to_json_c_string(&json!({ "jobId": job_id.to_string() }))?;
        Ok(())
    })
}

/// Current state of a job, as `ExportJobResponse` JSON.
///
/// # Safety
/// Pointers must be valid; `result` receives a string owned by the caller.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn csv_export_get_job(job_id: *const c_char, result: *mut *mut c_char) -> c_int {
    handle_status_result(|| unsafe {
        check_result_ptr(result)?;
        let id = parse_job_id(read_c_str(job_id, "job_id")?)?;

        let service = crate::globals::get_export_service()?;
        let job = block_on_async(async { Ok::<_, FFIError>(service.get_job(id).await?) })?;
        *result = to_json_c_string(&ExportJobResponse::from(&job))?;
        Ok(())
    })
}

/// Jobs newest first. A negative `owner_id` lists every owner's jobs.
///
/// # Safety
/// `result` must be valid and receives a string owned by the caller.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn csv_export_list_jobs(owner_id: i64, result: *mut *mut c_char) -> c_int {
    handle_status_result(|| unsafe {
        check_result_ptr(result)?;
        let owner = if owner_id < 0 { None } else { Some(owner_id) };

        let service = crate::globals::get_export_service()?;
        let jobs = block_on_async(async { Ok::<_, FFIError>(service.list_jobs(owner).await?) })?;
        let jobs: Vec<ExportJobResponse> = jobs.iter().map(ExportJobResponse::from).collect();
        *result = to_json_c_string(&jobs)?;
        Ok(())
    })
}

/// Remove a job and its tables.
///
/// # Safety
/// `job_id` must be a valid NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn csv_export_delete_job(job_id: *const c_char) -> c_int {
    handle_status_result(|| unsafe {
        let id = parse_job_id(read_c_str(job_id, "job_id")?)?;

        let service = crate::globals::get_export_service()?;
        block_on_async(async { Ok::<_, FFIError>(service.delete_job(id).await?) })
    })
}

/// Remove every job. Writes `{"removed": n}`.
///
/// # Safety
/// `result` must be valid and receives a string owned by the caller.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn csv_export_purge_jobs(result: *mut *mut c_char) -> c_int {
    handle_status_result(|| unsafe {
        check_result_ptr(result)?;
        let service = crate::globals::get_export_service()?;
        let removed = block_on_async(async { Ok::<_, FFIError>(service.purge_all_jobs().await?) })?;
        *result = to_json_c_string(&json!({ "removed": removed }))?;
        Ok(())
    })
}

/// Stream a finished job's CSV into `output_path`. The job is deleted afterwards.
///
/// # Safety
/// Pointers must be valid; `result` receives a string owned by the caller.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn csv_export_download_csv(
    job_id: *const c_char,
    output_path: *const c_char,
    result: *mut *mut c_char,
) -> c_int {
    handle_status_result(|| unsafe {
        check_result_ptr(result)?;
        let id = parse_job_id(read_c_str(job_id, "job_id")?)?;
        let path = PathBuf::from(read_c_str(output_path, "output_path")?);

        let response = block_on_async(download_to_path(id, path))?;
        *result = to_json_c_string(&response)?;
        Ok(())
    })
}

async fn download_to_path(id: Uuid, path: PathBuf) -> FFIResult<DownloadResponse> {
    let service = crate::globals::get_export_service()?;
    download_with(service.as_ref(), id, path).await
}

async fn download_with(service: &dyn ExportService, id: Uuid, path: PathBuf) -> FFIResult<DownloadResponse> {
    let job = service.get_job(id).await?;
    // an existing file at `path` is only replaced once there is something to write
    if !job.status_step.is_done() {
        return Err(DomainError::JobNotReady {
            id,
            status: job.status_step.to_string(),
        }
        .into());
    }
    let file_name = suggested_filename(&job, Utc::now().date_naive());

    let mut file = tokio::fs::File::create(&path).await.map_err(|e| {
        FFIError::new(ErrorCode::FileError, &format!("Cannot create {}: {}", path.display(), e))
    })?;

    match service.download_csv(id, &mut file).await {
        Ok(stats) => Ok(DownloadResponse {
            file_name,
            path: path.display().to_string(),
            stats,
        }),
        Err(e) => {
            drop(file);
            if let Err(remove_err) = tokio::fs::remove_file(&path).await {
                log::warn!("Failed to remove partial export {}: {}", path.display(), remove_err);
            }
            Err(e.into())
        }
    }
}

/// Free a string previously returned through a `result` pointer.
///
/// # Safety
/// `ptr` must be null or come from one of this library's functions, and be freed once.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn csv_export_free(ptr: *mut c_char) {
    if !ptr.is_null() {
        unsafe {
            drop(CString::from_raw(ptr));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::export::repository::{ExportJobRepository, SqliteExportJobRepository};
    use crate::domains::export::schema::StoreSchema;
    use crate::domains::export::service::ExportServiceImpl;
    use crate::domains::export::test_support::TestStore;
    use crate::domains::export::types::{ExportJob, ExportStatus};
    use crate::domains::export::writers::CsvConfig;

    #[test]
    fn test_parse_job_id() {
        let id = Uuid::new_v4();
        assert_eq!(parse_job_id(&id.to_string()).unwrap(), id);
        assert_eq!(parse_job_id("not-a-uuid").unwrap_err().code, ErrorCode::InvalidUuid);
    }

    #[test]
    fn test_null_arguments_are_rejected() {
        let mut out: *mut c_char = std::ptr::null_mut();
        let code = unsafe { csv_export_get_job(std::ptr::null(), &mut out) };
        assert_eq!(code, ErrorCode::NullPointer as c_int);
        assert!(out.is_null());

        let code = unsafe { csv_export_list_jobs(1, std::ptr::null_mut()) };
        assert_eq!(code, ErrorCode::NullPointer as c_int);
    }

    #[test]
    fn test_malformed_request_is_a_validation_error() {
        let body = CString::new("{not json").unwrap();
        let mut out: *mut c_char = std::ptr::null_mut();
        let code = unsafe { csv_export_submit(body.as_ptr(), 1, &mut out) };
        assert_eq!(code, ErrorCode::ValidationFailed as c_int);
    }

    #[tokio::test]
    async fn test_download_of_unfinished_job_leaves_existing_file() {
        let store = TestStore::seeded().await;
        let service = ExportServiceImpl::with_sqlite(store.pool.clone(), StoreSchema::default(), CsvConfig::default());
        let job = ExportJob {
            id: Uuid::new_v4(),
            scratch_table_name: "wp_csvexport_scratch_0a0a0a0".to_string(),
            result_table_name: "wp_csvexport_results_0a0a0a0".to_string(),
            status_step: ExportStatus::FilteringEntities,
            owner_id: 1,
            entity_type_label: "Posts".to_string(),
            start_time: Utc::now(),
            compiled_statements: None,
        };
        SqliteExportJobRepository::new(store.pool.clone()).create_job(&job).await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.csv");
        std::fs::write(&path, "keep me").unwrap();

        let err = download_with(&service, job.id, path.clone()).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::JobNotReady);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "keep me");
        assert_eq!(service.get_job_status(job.id).await.unwrap(), ExportStatus::FilteringEntities);
    }

    #[tokio::test]
    async fn test_download_of_finished_job_writes_file() {
        let store = TestStore::seeded().await;
        let service = ExportServiceImpl::with_sqlite(store.pool.clone(), StoreSchema::default(), CsvConfig::default());
        let request = ExportRequest::from_json(
            r#"{"objectType":"post","fields":[{"field":"default.post_title","csvLabel":"Title"}]}"#,
        )
        .unwrap();
        let id = service.submit_request(request, 1).await.unwrap();
        service.wait_for_job(id).await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.csv");
        let response = download_with(&service, id, path.clone()).await.unwrap();

        assert!(response.file_name.starts_with("csvexport-"));
        assert!(std::fs::read_to_string(&path).unwrap().starts_with("Title\n"));
    }

    #[test]
    fn test_free_accepts_null_and_owned_strings() {
        unsafe {
            csv_export_free(std::ptr::null_mut());
            csv_export_free(CString::new("x").unwrap().into_raw());
        }
    }
}
