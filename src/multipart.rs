//! multipart 表单上传：字段先流式暂存，再逐个文件校验并落盘。

use axum::extract::Multipart;
use axum::extract::multipart::Field;
use std::path::PathBuf;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::copier::{self, WriteMode};
use crate::error::{ApiError, UploadError};
use crate::response::Stored;
use crate::sanitize::sanitize;
use crate::upload::UploadContext;

/// 表单层报告的单字段错误码。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum FieldErrorCode {
    Ok = 0,
    Partial = 3,
    NoFile = 4,
    CantWrite = 7,
}

/// 已暂存的单个文件字段。
#[derive(Debug)]
pub struct StagedFile {
    pub field_name: String,
    pub filename: String,
    pub content_type: Option<String>,
    pub size: u64,
    pub temp_path: Option<PathBuf>,
    pub error: FieldErrorCode,
}

impl StagedFile {
    async fn discard(&self) {
        if let Some(path) = &self.temp_path
            && let Err(err) = fs::remove_file(path).await
        {
            warn!(path = ?path, error = %err, "failed to remove staging file");
        }
    }
}

/// 同名字段可能是单个文件，也可能是文件列表（`name[]` 或重复字段名）。
#[derive(Debug)]
pub enum FileField {
    Single(StagedFile),
    List(Vec<StagedFile>),
}

impl FileField {
    fn new(file: StagedFile) -> Self {
        if file.field_name.ends_with("[]") {
            FileField::List(vec![file])
        } else {
            FileField::Single(file)
        }
    }

    fn push(self, file: StagedFile) -> Self {
        match self {
            FileField::Single(first) => FileField::List(vec![first, file]),
            FileField::List(mut files) => {
                files.push(file);
                FileField::List(files)
            }
        }
    }

    fn into_files(self) -> Vec<StagedFile> {
        match self {
            FileField::Single(file) => vec![file],
            FileField::List(files) => files,
        }
    }
}

/// 按字段名首次出现顺序分组的暂存结果。
#[derive(Debug, Default)]
pub struct StagedForm {
    fields: Vec<(String, FileField)>,
}

impl StagedForm {
    fn insert(&mut self, file: StagedFile) {
        match self
            .fields
            .iter()
            .position(|(name, _)| *name == file.field_name)
        {
            Some(index) => {
                let (name, field) = self.fields.remove(index);
                self.fields.insert(index, (name, field.push(file)));
            }
            None => {
                let name = file.field_name.clone();
                self.fields.push((name, FileField::new(file)));
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// 展开为逐文件任务序列。
    pub fn into_files(self) -> impl Iterator<Item = StagedFile> {
        self.fields
            .into_iter()
            .flat_map(|(_, field)| field.into_files())
    }
}

/// 读取 multipart 请求体，把每个文件字段写入暂存目录。
pub async fn stage_form(
    context: &UploadContext,
    mut multipart: Multipart,
) -> Result<StagedForm, ApiError> {
    let mut form = StagedForm::default();
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) if form.is_empty() => {
                warn!(error = %err, "invalid multipart body");
                return Err(ApiError::BadRequest("Invalid multipart body".into()));
            }
            Err(err) => {
                warn!(error = %err, "multipart body ended unexpectedly");
                break;
            }
        };
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        let staged = stage_field(context, field, filename).await;
        let interrupted = staged.error == FieldErrorCode::Partial;
        form.insert(staged);
        if interrupted {
            break;
        }
    }
    Ok(form)
}

async fn stage_field(context: &UploadContext, mut field: Field<'_>, filename: String) -> StagedFile {
    let mut staged = StagedFile {
        field_name: field.name().unwrap_or_default().to_string(),
        filename,
        content_type: field.content_type().map(str::to_string),
        size: 0,
        temp_path: None,
        error: FieldErrorCode::Ok,
    };
    if staged.filename.is_empty() {
        staged.error = FieldErrorCode::NoFile;
        return staged;
    }

    let temp_path = context
        .config
        .temp_dir
        .join(format!("{}.part", Uuid::new_v4()));
    let mut file = match File::create(&temp_path).await {
        Ok(file) => file,
        Err(err) => {
            warn!(path = ?temp_path, error = %err, "failed to create staging file");
            staged.error = FieldErrorCode::CantWrite;
            return staged;
        }
    };
    staged.temp_path = Some(temp_path);

    loop {
        match field.chunk().await {
            Ok(Some(chunk)) => {
                staged.size += chunk.len() as u64;
                // 超限后停止暂存，剩余数据由下一次 next_field 跳过
                if context.config.exceeds_limit(staged.size) {
                    break;
                }
                if let Err(err) = file.write_all(&chunk).await {
                    warn!(error = %err, "failed to write staging file");
                    staged.error = FieldErrorCode::CantWrite;
                    break;
                }
            }
            Ok(None) => break,
            Err(err) => {
                warn!(field = staged.field_name, error = %err, "multipart field interrupted");
                staged.error = FieldErrorCode::Partial;
                break;
            }
        }
    }
    if let Err(err) = file.flush().await
        && staged.error == FieldErrorCode::Ok
    {
        warn!(error = %err, "failed to flush staging file");
        staged.error = FieldErrorCode::CantWrite;
    }

    debug!(
        field = staged.field_name,
        filename = staged.filename,
        content_type = staged.content_type.as_deref().unwrap_or(""),
        bytes = staged.size,
        "multipart field staged"
    );
    staged
}

/// 逐个处理暂存文件；单个文件失败不影响其他文件。
pub async fn store_form(
    context: &UploadContext,
    form: StagedForm,
) -> Vec<Result<Stored, UploadError>> {
    let mut results = Vec::new();
    for staged in form.into_files() {
        let result = store_file(context, &staged).await;
        staged.discard().await;
        if let Err(err) = &result {
            warn!(filename = staged.filename, error = %err, "multipart file rejected");
        }
        results.push(result);
    }
    results
}

async fn store_file(context: &UploadContext, staged: &StagedFile) -> Result<Stored, UploadError> {
    if staged.error != FieldErrorCode::Ok {
        return Err(UploadError::FieldError(staged.error as u8));
    }
    if context.config.exceeds_limit(staged.size) {
        return Err(UploadError::SizeLimit);
    }
    let temp_path = staged
        .temp_path
        .as_ref()
        .ok_or(UploadError::FieldError(FieldErrorCode::CantWrite as u8))?;

    let filename = sanitize(&staged.filename, &context.storage).await;
    let target = context.storage.resolve_file(filename.as_str()).await?;
    let mut source = File::open(temp_path)
        .await
        .map_err(|err| UploadError::io("Failed to move uploaded file", err))?;
    copier::copy(&mut source, &target, WriteMode::Truncate)
        .await
        .map_err(|err| UploadError::io("Failed to move uploaded file", err))?;

    info!(filename = %filename, bytes = staged.size, "multipart file stored");
    Ok(Stored::File {
        filename: filename.into_string(),
        size: staged.size,
    })
}
