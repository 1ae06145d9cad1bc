//! Flat text file holding one relay url per line.

use std::{fs, io, path::Path};

/// Urls listed in `path`, or `None` when the file does not exist.
/// Blank lines and lines starting with `#` are skipped.
pub fn load(path: &Path) -> io::Result<Option<Vec<String>>> {
  let contents = match fs::read_to_string(path) {
    Ok(contents) => contents,
    Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
    Err(err) => return Err(err),
  };

  Ok(Some(parse(&contents)))
}

fn parse(contents: &str) -> Vec<String> {
  contents
    .lines()
    .map(str::trim)
    .filter(|line| !line.is_empty() && !line.starts_with('#'))
    .map(str::to_string)
    .collect()
}

pub fn save(path: &Path, urls: &[String]) -> io::Result<()> {
  let mut contents = urls.join("\n");
  contents.push('\n');
  fs::write(path, contents)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[cfg(test)]
  use pretty_assertions::assert_eq;

  #[test]
  fn test_parse_skips_blanks_and_comments() {
    let contents = "# relays\nwss://relay.damus.io\n\n  wss://nos.lol  \n#wss://dead.relay\n";
    assert_eq!(
      parse(contents),
      vec![String::from("wss://relay.damus.io"), String::from("wss://nos.lol")]
    );
  }

  #[test]
  fn test_save_then_load() {
    let path = std::env::temp_dir().join(format!("nostr-cli-relays-{}.txt", std::process::id()));
    assert_eq!(load(&path).unwrap(), None);

    let urls = vec![String::from("wss://a.relay"), String::from("wss://b.relay")];
    save(&path, &urls).unwrap();
    assert_eq!(load(&path).unwrap(), Some(urls));

    fs::remove_file(&path).unwrap();
  }
}
