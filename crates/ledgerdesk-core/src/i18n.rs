//! Console strings in English and Turkish.
//!
//! The selected language is persisted in session storage under `language`
//! and survives logout.

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Language {
    En,
    #[default]
    Tr,
}

impl Language {
    pub fn code(&self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Tr => "tr",
        }
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "en" => Ok(Self::En),
            "tr" => Ok(Self::Tr),
            other => Err(format!("Unsupported language: {}", other)),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// (key, English, Turkish)
const TRANSLATIONS: &[(&str, &str, &str)] = &[
    // Navigation
    ("nav.dashboard", "Dashboard", "Kontrol Paneli"),
    ("nav.financialRecords", "Financial Records", "Mali Kayıtlar"),
    ("nav.logout", "Logout", "Çıkış"),
    ("nav.welcome", "Welcome", "Hoş geldiniz"),
    // Customer
    ("customer.allCustomers", "All Customers", "Tüm Müşteriler"),
    ("customer.noCustomersYet", "No customers yet", "Henüz müşteri yok"),
    // Financial records
    ("records.title", "Financial Records", "Mali Kayıtlar"),
    ("records.input", "Input", "Giriş"),
    ("records.output", "Output", "Çıkış"),
    ("records.noRecords", "No records found", "Kayıt bulunamadı"),
    // Currency
    ("currency.dollar", "Dollar", "Dolar"),
    ("currency.euro", "Euro", "Euro"),
    ("currency.allCurrencies", "All Currencies", "Tüm Para Birimleri"),
    ("currency.noCurrencies", "No currencies yet", "Henüz para birimi yok"),
    // User
    ("user.allUsers", "All Users", "Tüm Kullanıcılar"),
    ("user.noUsers", "No users yet", "Henüz kullanıcı yok"),
    ("user.password", "Password", "Şifre"),
    // Messages
    ("msg.success", "Success", "Başarılı"),
    ("msg.error", "Error", "Hata"),
    ("msg.loading", "Loading...", "Yükleniyor..."),
    ("msg.incomeAdded", "Income added successfully!", "Gelir başarıyla eklendi!"),
    ("msg.outcomeAdded", "Outcome added successfully!", "Gider başarıyla eklendi!"),
    ("msg.customerCreated", "Customer created successfully!", "Müşteri başarıyla oluşturuldu!"),
    ("msg.userCreated", "User created successfully!", "Kullanıcı başarıyla oluşturuldu!"),
    ("msg.currencyCreated", "Currency created successfully!", "Para birimi başarıyla oluşturuldu!"),
    ("msg.noTransactions", "No transactions for this customer", "Bu müşteri için işlem yok"),
    // Login
    ("login.title", "Welcome Back", "Hoş Geldiniz"),
    ("login.subtitle", "Sign in to your account", "Hesabınıza giriş yapın"),
    ("login.emailLabel", "Email Address", "E-posta Adresi"),
    ("login.passwordLabel", "Password", "Şifre"),
    ("login.signingIn", "Signing in...", "Giriş yapılıyor..."),
    ("login.rememberMe", "Remember me", "Beni hatırla"),
    ("login.useSaved", "Use saved password?", "Kayıtlı şifre kullanılsın mı?"),
    ("login.success", "Signed in.", "Giriş yapıldı."),
    ("login.failed", "Sign in failed", "Giriş başarısız"),
    ("login.invalidCredentials", "Invalid email or password", "Geçersiz e-posta veya şifre"),
    // Console
    ("console.prompt", "Type 'help' for commands.", "Komutlar için 'help' yazın."),
    ("console.unknownCommand", "Unknown command", "Bilinmeyen komut"),
    ("console.usage", "Usage", "Kullanım"),
    ("console.languageChanged", "Language changed.", "Dil değiştirildi."),
    ("msg.updated", "Updated successfully!", "Başarıyla güncellendi!"),
    ("msg.deleted", "Deleted successfully!", "Başarıyla silindi!"),
    ("msg.currencyLinked", "Currency linked to customer.", "Para birimi müşteriye bağlandı."),
    ("msg.passwordChanged", "Password changed.", "Şifre değiştirildi."),
    ("msg.notFound", "Not found", "Bulunamadı"),
    // Session endings
    ("session.expired", "Your session has expired. Please sign in again.", "Oturumunuzun süresi doldu. Lütfen tekrar giriş yapın."),
    ("session.idle", "Signed out after 10 minutes of inactivity.", "10 dakika işlem yapılmadığı için oturum kapatıldı."),
    ("session.unauthorized", "The server rejected your session. Please sign in again.", "Sunucu oturumunuzu reddetti. Lütfen tekrar giriş yapın."),
    ("session.crossTab", "You were signed out in another window.", "Başka bir pencerede oturum kapatıldı."),
    ("session.signedOut", "You have signed out.", "Oturum kapatıldı."),
    ("session.invalidToken", "Your session could not be verified. Please sign in again.", "Oturumunuz doğrulanamadı. Lütfen tekrar giriş yapın."),
];

/// Look up a console string. Missing Turkish entries fall back to English,
/// unknown keys to the key itself.
pub fn t(language: Language, key: &str) -> &str {
    match TRANSLATIONS.iter().find(|(k, _, _)| *k == key) {
        Some(&(_, en, tr)) => match language {
            Language::En => en,
            Language::Tr if tr.is_empty() => en,
            Language::Tr => tr,
        },
        None => key,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_both_languages() {
        assert_eq!(t(Language::En, "nav.logout"), "Logout");
        assert_eq!(t(Language::Tr, "nav.logout"), "Çıkış");
    }

    #[test]
    fn test_unknown_key_returns_key() {
        assert_eq!(t(Language::Tr, "nav.unknown"), "nav.unknown");
    }

    #[test]
    fn test_language_codes() {
        assert_eq!("en".parse::<Language>(), Ok(Language::En));
        assert_eq!(" tr ".parse::<Language>(), Ok(Language::Tr));
        assert!("de".parse::<Language>().is_err());
        assert_eq!(Language::default(), Language::Tr);
        assert_eq!(Language::En.to_string(), "en");
    }

    #[test]
    fn test_keys_are_unique() {
        let mut keys: Vec<&str> = TRANSLATIONS.iter().map(|(k, _, _)| *k).collect();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), TRANSLATIONS.len());
    }
}
