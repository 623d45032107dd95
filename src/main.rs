use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use inquire::{Confirm, DateSelect, InquireError, Select, Text};
use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use invoice_desk::compute::{parse_quantity, parse_unit_price};
use invoice_desk::config::{self, AppSettings, ConfigError};
use invoice_desk::render::{self, Renderer};
use invoice_desk::{
    Assistant, ClientField, CompanyField, DocumentStore, FieldPath, FileCache, GeminiClient,
    ItemChange, PointerEvent, RenderError, RootField, SignatureError, SignaturePad,
};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "bmp"];

// ==========================================
// Errors
// ==========================================

#[derive(Debug, Error)]
enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    #[error("Signature error: {0}")]
    Signature(#[from] SignatureError),

    #[error("Prompt error: {0}")]
    Prompt(#[from] InquireError),

    #[error("Invalid stroke file: {0}")]
    Strokes(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Usage(String),
}

type Store = DocumentStore<FileCache>;

// ==========================================
// CLI
// ==========================================

#[derive(Parser)]
#[command(name = "invoice-desk", about = "Invoices and quotations from the terminal")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fill in a new document and export it to PDF
    New,
    /// Edit the saved company profile
    Company,
    /// Set or remove the company logo
    Logo {
        /// Image file (opens a picker when omitted)
        path: Option<PathBuf>,
        /// Remove the current logo
        #[arg(long, conflicts_with = "path")]
        clear: bool,
    },
    /// Draw, upload or clear the signature
    Sign {
        /// Image file to use as the signature
        #[arg(long, conflicts_with_all = ["strokes", "clear"])]
        image: Option<PathBuf>,
        /// JSON file of recorded pointer events to replay
        #[arg(long, conflicts_with = "clear")]
        strokes: Option<PathBuf>,
        /// Remove the current signature
        #[arg(long)]
        clear: bool,
        /// Also write the signature surface to this PNG file
        #[arg(long)]
        save_surface: Option<PathBuf>,
    },
    /// Show the document a new session starts from
    Preview,
    /// Configure output directory and text-generation settings
    Config,
}

// ==========================================
// Main Function
// ==========================================

fn main() -> Result<(), AppError> {
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        use clap::CommandFactory;
        Cli::command().print_help()?;
        return Ok(());
    };

    // 1. Settings first, so the log level can come from them
    let settings = match command {
        Commands::Config => setup_config_wizard()?,
        _ => match config::load_settings()? {
            Some(settings) => settings,
            None => setup_config_wizard()?,
        },
    };
    init_logging(&settings);

    // 2. Session document, seeded from the cached company profile
    let cache_dir = config::cache_dir()?;
    let mut store = DocumentStore::initialize(FileCache::new(cache_dir));

    let result = match command {
        Commands::New => new_document(&mut store, &settings),
        Commands::Company => edit_company(&mut store),
        Commands::Logo { path, clear } => set_logo(&mut store, path, clear),
        Commands::Sign {
            image,
            strokes,
            clear,
            save_surface,
        } => sign(&mut store, image, strokes, clear, save_surface),
        Commands::Preview => {
            println!("{}", render::preview(store.document()));
            Ok(())
        }
        Commands::Config => Ok(()),
    };

    match result {
        Err(AppError::Prompt(
            InquireError::OperationCanceled | InquireError::OperationInterrupted,
        )) => {
            println!("Cancelled");
            Ok(())
        }
        other => other,
    }
}

fn init_logging(settings: &AppSettings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.log_level.as_str()));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

// ==========================================
// 1. New Document Session
// ==========================================

fn new_document(store: &mut Store, settings: &AppSettings) -> Result<(), AppError> {
    let client = GeminiClient::new(config::api_key_from_env(), &settings.api_base, &settings.model);
    if !client.has_credential() {
        warn!(
            "API key missing: AI features for polishing legal text will not work. Set GEMINI_API_KEY or API_KEY."
        );
    }
    let assistant = Assistant::new(client);

    println!("\n--- Document Details ---");
    let kind = Select::new("Type:", vec!["QUOTATION", "INVOICE"]).prompt()?;
    store.update_field(FieldPath::Root(RootField::DocumentType), kind);
    prompt_field(store, "Document Number:", FieldPath::Root(RootField::DocumentNumber))?;
    prompt_date(store, "Date:", FieldPath::Root(RootField::Date))?;
    prompt_date(store, "Due / Valid Until:", FieldPath::Root(RootField::DueDate))?;
    prompt_field(store, "Currency Symbol:", FieldPath::Root(RootField::CurrencySymbol))?;

    println!("\n--- Client Details ---");
    prompt_field(store, "Client Name:", FieldPath::Client(ClientField::Name))?;
    prompt_field(store, "Client Email:", FieldPath::Client(ClientField::Email))?;
    prompt_field(store, "Client Address:", FieldPath::Client(ClientField::Address))?;
    prompt_field(store, "Client Phone:", FieldPath::Client(ClientField::Phone))?;

    edit_items(store)?;
    edit_terms(store, &assistant)?;
    edit_notes(store, &assistant)?;

    println!("\n{}", render::preview(store.document()));

    if Confirm::new("Export to PDF?").with_default(true).prompt()? {
        export(store, settings)?;
    }
    Ok(())
}

fn prompt_field(store: &mut Store, label: &str, path: FieldPath) -> Result<(), AppError> {
    let current = current_text(store, path);
    let value = Text::new(label).with_default(&current).prompt()?;
    store.update_field(path, value);
    Ok(())
}

fn prompt_date(store: &mut Store, label: &str, path: FieldPath) -> Result<(), AppError> {
    let current = current_text(store, path);
    // Dates are free text; only offer the calendar when the current value parses
    let Ok(default) = NaiveDate::parse_from_str(&current, "%Y-%m-%d") else {
        return prompt_field(store, label, path);
    };
    let date = DateSelect::new(label).with_default(default).prompt()?;
    store.update_field(path, date.format("%Y-%m-%d").to_string());
    Ok(())
}

fn current_text(store: &Store, path: FieldPath) -> String {
    let doc = store.document();
    match path {
        FieldPath::Root(field) => match field {
            RootField::DocumentType => doc.document_type.to_string(),
            RootField::DocumentNumber => doc.document_number.clone(),
            RootField::Date => doc.date.clone(),
            RootField::DueDate => doc.due_date.clone(),
            RootField::CurrencySymbol => doc.currency_symbol.clone(),
            RootField::Notes => doc.notes.clone(),
            RootField::Terms => doc.terms.clone(),
        },
        FieldPath::Company(field) => match field {
            CompanyField::Name => doc.company.name.clone(),
            CompanyField::OwnerName => doc.company.owner_name.clone(),
            CompanyField::Address => doc.company.address.clone(),
            CompanyField::Email => doc.company.email.clone(),
            CompanyField::Website => doc.company.website.clone(),
            CompanyField::LogoUrl => doc.company.logo_url.clone().unwrap_or_default(),
            CompanyField::SignatureUrl => doc.company.signature_url.clone().unwrap_or_default(),
        },
        FieldPath::Client(field) => match field {
            ClientField::Name => doc.client.name.clone(),
            ClientField::Email => doc.client.email.clone(),
            ClientField::Address => doc.client.address.clone(),
            ClientField::Phone => doc.client.phone.clone(),
        },
    }
}

// ==========================================
// 2. Line Items
// ==========================================

const ADD_ITEM_OPT: &str = "➕ Add Item";
const DONE_OPT: &str = "✅ Done";

fn edit_items(store: &mut Store) -> Result<(), AppError> {
    println!("\n--- Line Items ---");
    loop {
        let doc = store.document();
        let ids: Vec<String> = doc.items.iter().map(|item| item.id.clone()).collect();
        let mut options: Vec<String> = doc
            .items
            .iter()
            .map(|item| {
                format!(
                    "{} | {} x {}",
                    item.description,
                    item.quantity,
                    invoice_desk::format_money(&doc.currency_symbol, item.unit_price)
                )
            })
            .collect();
        options.push(ADD_ITEM_OPT.to_string());
        options.push(DONE_OPT.to_string());

        // Rows can share a label, so pick by position rather than by text
        let choice = Select::new("Select an item to edit:", options).raw_prompt()?;
        let id = match menu_choice(&ids, choice.index) {
            MenuChoice::Item(id) => id,
            MenuChoice::Add => store.add_item().id,
            MenuChoice::Done => return Ok(()),
        };
        edit_item(store, &id)?;
    }
}

#[derive(Debug, PartialEq)]
enum MenuChoice {
    Item(String),
    Add,
    Done,
}

// Item rows come first, then the add and done entries.
fn menu_choice(ids: &[String], index: usize) -> MenuChoice {
    match ids.get(index) {
        Some(id) => MenuChoice::Item(id.clone()),
        None if index == ids.len() => MenuChoice::Add,
        None => MenuChoice::Done,
    }
}

fn edit_item(store: &mut Store, id: &str) -> Result<(), AppError> {
    let Some(item) = store.document().item(id).cloned() else {
        return Ok(());
    };

    let action = Select::new("Action:", vec!["Edit", "Remove"]).prompt()?;
    if action == "Remove" {
        store.remove_item(id);
        return Ok(());
    }

    let description = Text::new("Description:").with_default(&item.description).prompt()?;
    store.update_item(id, ItemChange::Description(description));

    let quantity = Text::new("Qty:").with_default(&item.quantity.to_string()).prompt()?;
    store.update_item(id, ItemChange::Quantity(parse_quantity(&quantity)));

    let price = Text::new("Unit Price:").with_default(&item.unit_price.to_string()).prompt()?;
    store.update_item(id, ItemChange::UnitPrice(parse_unit_price(&price)));
    Ok(())
}

// ==========================================
// 3. Terms & Notes
// ==========================================

fn edit_terms(store: &mut Store, assistant: &Assistant<GeminiClient>) -> Result<(), AppError> {
    println!("\n--- Terms & Disclaimer ---\n{}\n", store.document().terms);
    let options = vec!["Keep", "AI Polish", "Reset Default", "Rewrite"];
    match Select::new("Terms:", options).prompt()? {
        "AI Polish" => {
            println!("🪄 Polishing...");
            match store.polish_terms(assistant) {
                Ok(doc) => println!("✅ Polished:\n{}", doc.terms),
                Err(e) => println!("❌ Failed to polish text. Check API Key. ({})", e),
            }
        }
        "Reset Default" => {
            store.reset_terms();
        }
        "Rewrite" => {
            println!("💡 Tip: Use '\\n' for new lines.");
            let text = Text::new("Terms:").prompt()?;
            store.update_field(FieldPath::Root(RootField::Terms), text.replace("\\n", "\n"));
        }
        _ => {}
    }
    Ok(())
}

fn edit_notes(store: &mut Store, assistant: &Assistant<GeminiClient>) -> Result<(), AppError> {
    println!("\n--- Footer Note ---\n{}\n", store.document().notes);
    match Select::new("Footer note:", vec!["Keep", "Generate", "Rewrite"]).prompt()? {
        "Generate" => {
            println!("🪄 Generating...");
            let doc = store.generate_note(assistant);
            println!("✅ Note: {}", doc.notes);
        }
        "Rewrite" => {
            let text = Text::new("Note:").prompt()?;
            store.update_field(FieldPath::Root(RootField::Notes), text);
        }
        _ => {}
    }
    Ok(())
}

// ==========================================
// 4. Company Profile, Logo & Signature
// ==========================================

fn edit_company(store: &mut Store) -> Result<(), AppError> {
    println!("\n--- Your Company ---");
    prompt_field(store, "Company Name:", FieldPath::Company(CompanyField::Name))?;
    prompt_field(store, "Owner Name:", FieldPath::Company(CompanyField::OwnerName))?;
    prompt_field(store, "Address:", FieldPath::Company(CompanyField::Address))?;
    prompt_field(store, "Email / Contact:", FieldPath::Company(CompanyField::Email))?;
    prompt_field(store, "Website:", FieldPath::Company(CompanyField::Website))?;
    println!("✅ Company profile saved.");
    Ok(())
}

fn set_logo(store: &mut Store, path: Option<PathBuf>, clear: bool) -> Result<(), AppError> {
    if clear {
        store.clear_logo();
        println!("✅ Logo removed.");
        return Ok(());
    }
    let Some(path) = path.or_else(|| pick_image("Select Company Logo")) else {
        println!("❌ No file selected.");
        return Ok(());
    };
    let bytes = fs::read(&path)?;
    store.set_logo(&bytes)?;
    println!("✓ Logo uploaded");
    Ok(())
}

fn sign(
    store: &mut Store,
    image: Option<PathBuf>,
    strokes: Option<PathBuf>,
    clear: bool,
    save_surface: Option<PathBuf>,
) -> Result<(), AppError> {
    let mut pad = SignaturePad::new();
    // Show whatever signature the session started with
    if let Err(e) = pad.sync(store.document().company.signature_url.as_deref()) {
        warn!("Stored signature could not be shown, starting blank: {}", e);
    }

    if clear {
        pad.clear(store);
        println!("✅ Signature cleared.");
    } else if let Some(path) = strokes {
        let events: Vec<PointerEvent> = serde_json::from_slice(&fs::read(&path)?)?;
        let count = pad.replay(&events, store)?;
        println!("✅ Replayed {} event(s), {} stroke(s) saved.", events.len(), count);
    } else {
        let path = image.or_else(|| pick_image("Select Signature Image"));
        let Some(path) = path else {
            return Err(AppError::Usage(
                "Pass --image, --strokes or --clear".to_string(),
            ));
        };
        pad.upload(&fs::read(&path)?, store)?;
        println!("✅ Signature uploaded.");
    }

    if let Some(out) = save_surface {
        pad.surface().save(&out).map_err(SignatureError::from)?;
        println!("🖊  Surface written to {}", out.display());
    }
    Ok(())
}

fn pick_image(title: &str) -> Option<PathBuf> {
    println!("📂 Opening file picker...");
    rfd::FileDialog::new()
        .set_title(title)
        .add_filter("Images", IMAGE_EXTENSIONS)
        .pick_file()
}

// ==========================================
// 5. Export
// ==========================================

fn export(store: &Store, settings: &AppSettings) -> Result<(), AppError> {
    let root = settings.output_root();
    let renderer = Renderer::from_dir(&root.join("templates"))?;
    let sources = render::write_sources(store.document(), &renderer, &root)?;

    println!("\n🔨 Compiling PDF...");
    match render::compile(&sources) {
        Ok(()) => {
            info!(pdf = %sources.pdf_path.display(), "document exported");
            println!("✅ PDF Generated: {:?}", sources.pdf_path);
            open_and_reveal(&sources.pdf_path);
            Ok(())
        }
        Err(RenderError::TypstMissing) => {
            println!(
                "❌ Error: 'typst' is not installed. Please install it (brew install typst)."
            );
            println!("   Source kept at {:?}", sources.typ_path);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

// Helper: Open file and reveal in Finder/Explorer
fn open_and_reveal(path: &Path) {
    #[cfg(target_os = "macos")]
    Command::new("open").arg("-R").arg(path).spawn().ok();

    #[cfg(target_os = "windows")]
    Command::new("explorer")
        .arg(format!("/select,{}", path.to_string_lossy()))
        .spawn()
        .ok();

    #[cfg(target_os = "linux")]
    if let Some(parent) = path.parent() {
        Command::new("xdg-open").arg(parent).spawn().ok();
    }

    #[cfg(target_os = "macos")]
    Command::new("open").arg(path).spawn().ok();

    #[cfg(target_os = "windows")]
    Command::new("explorer").arg(path).spawn().ok();

    #[cfg(target_os = "linux")]
    Command::new("xdg-open").arg(path).spawn().ok();
}

// ==========================================
// 6. Config
// ==========================================

fn setup_config_wizard() -> Result<AppSettings, AppError> {
    println!("\n⚙️  --- Configuration Setup ---");
    let current = config::load_settings().ok().flatten().unwrap_or_default();

    println!("📂 Opening folder picker...");
    let picked_path = rfd::FileDialog::new()
        .set_title("Select Output Directory")
        .pick_folder();

    let output_dir = if let Some(path) = picked_path {
        path.to_string_lossy().to_string()
    } else {
        println!("❌ No folder selected. Falling back to manual input.");
        Text::new("Enter Output Directory:")
            .with_default(&current.output_dir)
            .prompt()?
    };
    let model = Text::new("Text model:").with_default(&current.model).prompt()?;

    let settings = AppSettings {
        output_dir,
        model,
        ..current
    };
    let path = config::save_settings(&settings)?;
    println!("✅ Settings saved to {:?}", path);
    Ok(settings)
}
