use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rollcall_core::types::Embedding;
use rollcall_store::{AttendanceRow, AttendanceStore};

mod setup;

#[derive(Parser)]
#[command(name = "rollcall", about = "Rollcall attendance administration CLI")]
struct Cli {
    /// Path to the SQLite database file
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download and verify the pinned recognition models
    Setup {
        /// Target directory for model files
        #[arg(long)]
        model_dir: Option<String>,
    },
    /// Enroll a student from a directory of face images
    Enroll {
        /// Student name
        #[arg(short, long)]
        name: String,
        /// Matriculation number (unique)
        #[arg(short, long)]
        matric: String,
        /// Directory of face images (.jpg / .jpeg / .png)
        #[arg(short, long)]
        images: PathBuf,
        /// Directory for the generated encoding file
        #[arg(long)]
        encodings_dir: Option<PathBuf>,
        /// Directory containing the ONNX models
        #[arg(long)]
        model_dir: Option<PathBuf>,
    },
    /// Remove a student, their attendance history, and their encoding file
    Remove {
        /// Matriculation number
        matric: String,
    },
    /// List enrolled students
    List {
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Today's first check-in per student
    Report,
    /// Export today's attendance as CSV
    ExportCsv {
        /// Output file (stdout when omitted)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Delete today's attendance records
    ResetToday,
}

fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("rollcall")
}

fn default_db_path() -> PathBuf {
    std::env::var("ROLLCALL_DB_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| data_dir().join("attendance.db"))
}

fn default_encodings_dir() -> PathBuf {
    data_dir().join("encodings")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let db_path = cli.db.clone().unwrap_or_else(default_db_path);

    match cli.command {
        Commands::Setup { model_dir } => setup::run(model_dir)?,

        Commands::Enroll {
            name,
            matric,
            images,
            encodings_dir,
            model_dir,
        } => {
            let store = open_store(&db_path).await?;
            enroll(
                &store,
                &name,
                &matric,
                &images,
                &encodings_dir.unwrap_or_else(default_encodings_dir),
                &model_dir.unwrap_or_else(rollcall_models::default_model_dir),
            )
            .await?;
        }

        Commands::Remove { matric } => {
            let store = open_store(&db_path).await?;
            let removed = store.remove_student(&matric).await?;
            if let Some(path) = removed.encoding_path.as_deref() {
                if let Err(e) = std::fs::remove_file(path) {
                    eprintln!("warning: could not delete encoding file {path}: {e}");
                }
            }
            println!(
                "removed student {matric} and {} attendance record(s)",
                removed.attendance_deleted
            );
        }

        Commands::List { json } => {
            let store = open_store(&db_path).await?;
            let students = store.all_students().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&students)?);
            } else if students.is_empty() {
                println!("no students enrolled");
            } else {
                for s in students {
                    let status = if s.encoding_path.is_some() {
                        "enrolled"
                    } else {
                        "no encoding"
                    };
                    println!("{:>4}  {:<12} {:<28} {status}", s.id, s.matric_no, s.name);
                }
            }
        }

        Commands::Report => {
            let store = open_store(&db_path).await?;
            let rows = store.first_checkins_today().await?;
            if rows.is_empty() {
                println!("no attendance recorded today");
            }
            for (i, row) in rows.iter().enumerate() {
                println!(
                    "{:>3}. {} ({}) @ {}",
                    i + 1,
                    row.name,
                    row.matric_no,
                    row.checked_in_at
                );
            }
        }

        Commands::ExportCsv { out } => {
            let store = open_store(&db_path).await?;
            let csv = render_csv(&store.attendance_today().await?);
            match out {
                Some(path) => {
                    std::fs::write(&path, csv)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    println!("wrote {}", path.display());
                }
                None => print!("{csv}"),
            }
        }

        Commands::ResetToday => {
            let store = open_store(&db_path).await?;
            let deleted = store.reset_today().await?;
            println!("deleted {deleted} attendance record(s) for today");
        }
    }

    Ok(())
}

async fn open_store(db_path: &Path) -> Result<AttendanceStore> {
    AttendanceStore::open(db_path)
        .await
        .with_context(|| format!("failed to open database at {}", db_path.display()))
}

/// Enroll one student: best face per image, mean embedding re-normalized,
/// encoding file written, student row inserted.
async fn enroll(
    store: &AttendanceStore,
    name: &str,
    matric: &str,
    images_dir: &Path,
    encodings_dir: &Path,
    model_dir: &Path,
) -> Result<()> {
    // Refuse duplicates before any model work
    if store
        .all_students()
        .await?
        .iter()
        .any(|s| s.matric_no == matric)
    {
        bail!("a student with matric number '{matric}' already exists");
    }

    rollcall_models::verify_models_dir(model_dir)
        .context("model verification failed — run `rollcall setup` first")?;

    let mut enroller = rollcall_core::FaceEnroller::load(
        &model_dir.join("det_10g.onnx"),
        &model_dir.join("w600k_r50.onnx"),
    )?;

    let mut image_paths: Vec<PathBuf> = std::fs::read_dir(images_dir)
        .with_context(|| format!("cannot read image directory {}", images_dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| has_image_extension(p))
        .collect();
    image_paths.sort();

    if image_paths.is_empty() {
        bail!("no face images found in {}", images_dir.display());
    }

    let mut embeddings = Vec::new();
    for path in &image_paths {
        let image = match image::open(path) {
            Ok(img) => img.to_rgb8(),
            Err(e) => {
                eprintln!("warning: cannot read {}: {e}", path.display());
                continue;
            }
        };
        match enroller.best_face_embedding(&image)? {
            Some((embedding, confidence)) => {
                println!("  {}: face found (confidence {confidence:.2})", path.display());
                embeddings.push(embedding);
            }
            None => eprintln!("warning: no face detected in {}", path.display()),
        }
    }

    if embeddings.is_empty() {
        bail!("no usable face found in any of the {} image(s)", image_paths.len());
    }

    let mean = mean_embedding(&embeddings);
    let encoding_path = encodings_dir.join(format!("{}.bin", sanitize_matric(matric)));
    rollcall_store::write_encoding(&encoding_path, &mean)
        .with_context(|| format!("failed to write {}", encoding_path.display()))?;

    let encoding_str = encoding_path
        .to_str()
        .context("encoding path is not valid UTF-8")?;
    let id = store.add_student(name, matric, Some(encoding_str)).await?;

    println!(
        "enrolled {name} ({matric}) as student #{id} from {} image(s)",
        embeddings.len()
    );
    Ok(())
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_ascii_lowercase();
            e == "jpg" || e == "jpeg" || e == "png"
        })
        .unwrap_or(false)
}

/// Mean of several embeddings, re-normalized to unit length.
fn mean_embedding(embeddings: &[Embedding]) -> Embedding {
    let dim = embeddings[0].values.len();
    let mut mean = vec![0.0f32; dim];
    for embedding in embeddings {
        for (m, v) in mean.iter_mut().zip(&embedding.values) {
            *m += v;
        }
    }
    let n = embeddings.len() as f32;
    for m in &mut mean {
        *m /= n;
    }
    Embedding {
        values: rollcall_core::encoder::l2_normalize(mean),
    }
}

fn sanitize_matric(matric: &str) -> String {
    matric
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Today's attendance as CSV, matching the dashboard export format.
fn render_csv(rows: &[AttendanceRow]) -> String {
    let mut out = String::from("No.,Name,Matric No,Check-In Time\n");
    for (i, row) in rows.iter().enumerate() {
        out.push_str(&format!(
            "{},{},{},{}\n",
            i + 1,
            csv_field(&row.name),
            csv_field(&row.matric_no),
            csv_field(&row.checked_in_at)
        ));
    }
    out
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
