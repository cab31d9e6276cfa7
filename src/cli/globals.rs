use secrecy::SecretString;

/// Settings shared across actions: the directory connection and the cookie
/// domain knobs used when building the auth state.
#[derive(Debug, Clone)]
pub struct GlobalArgs {
    pub ldap_url: String,
    pub ldap_domain: String,
    pub ldap_base_dn: String,
    pub ldap_bind_dn: String,
    pub ldap_bind_password: SecretString,
    pub frontend_base_url: String,
    pub session_ttl_minutes: i64,
}

impl GlobalArgs {
    #[must_use]
    pub fn new(ldap_url: String) -> Self {
        Self {
            ldap_url,
            ldap_domain: String::new(),
            ldap_base_dn: String::new(),
            ldap_bind_dn: String::new(),
            ldap_bind_password: SecretString::default(),
            frontend_base_url: String::new(),
            session_ttl_minutes: 60,
        }
    }

    pub fn set_bind_password(&mut self, password: SecretString) {
        self.ldap_bind_password = password;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_global_args() {
        let url = "ldaps://dc01.corp.example.com:636".to_string();
        let args = GlobalArgs::new(url);
        assert_eq!(args.ldap_url, "ldaps://dc01.corp.example.com:636");
        assert_eq!(args.ldap_bind_password.expose_secret(), "");
        assert_eq!(args.session_ttl_minutes, 60);
    }
}
