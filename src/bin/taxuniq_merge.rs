use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::BufWriter;

use taxuniq::{merge_count_files, write_taxon_counts};

fn spinner(color: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::default_spinner()
            .tick_strings(&[
                "⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏",
            ])
            .template(&format!("{{spinner:.{color}}} {{msg}}"))
            .expect("Invalid spinner template"),
    );
    bar
}

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 2 {
        eprintln!("Usage: taxuniq-merge <merged-output> <shard-counts>...");
        eprintln!("Shard files hold one taxon per line: taxid\\treads\\tkmers\\tcounter (.gz ok).");
        std::process::exit(2);
    }
    let (output, inputs) = args.split_first().expect("checked above");

    let bar = spinner("green");
    bar.set_message(format!("Merging {} count file(s)...", inputs.len()));
    let merged = merge_count_files(inputs).expect("Merging count files failed");
    bar.finish_with_message(format!("Merged counts for {} taxa.", merged.len()));

    let bar = spinner("yellow");
    bar.set_message(format!("Writing {output}..."));
    let mut writer = BufWriter::new(File::create(output).expect("Could not create output file"));
    write_taxon_counts(&mut writer, &merged).expect("Could not write merged counts");
    bar.finish_with_message("Merged counts written.");
}
