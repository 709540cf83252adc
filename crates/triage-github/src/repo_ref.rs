use anyhow::{anyhow, bail, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
/// `owner/name` repository reference.
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let (owner, name) = trimmed
            .split_once('/')
            .ok_or_else(|| anyhow!("invalid repository '{raw}', expected owner/repo"))?;
        let owner = owner.trim();
        let name = name.trim();
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            bail!("invalid repository '{raw}', expected owner/repo");
        }
        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }

    pub fn as_slug(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::RepoRef;

    #[test]
    fn unit_parse_accepts_owner_slash_name() {
        let repo = RepoRef::parse(" acme/widgets ").expect("parse");
        assert_eq!(repo.owner, "acme");
        assert_eq!(repo.as_slug(), "acme/widgets");
    }

    #[test]
    fn regression_parse_rejects_malformed_slugs() {
        for raw in ["acme", "/widgets", "acme/", "acme/widgets/extra"] {
            assert!(RepoRef::parse(raw).is_err(), "{raw} should be rejected");
        }
    }
}
