//! Email content for every campaign path.
//!
//! `Template` is closed: adding a campaign means adding a variant, and the
//! compiler points at every place that has to render it.

use serde::Serialize;

use counsel_db::models::ListingRow;
use counsel_types::models::{OutreachTemplate, PreferenceKind};

const DRIP_FROM: &str = "Wedding Counselors <hello@weddingcounselors.com>";
const DIGEST_FROM: &str = "Wedding Counselors <digest@weddingcounselors.com>";
const OUTREACH_FROM: &str = "Wedding Counselors <outreach@weddingcounselors.com>";
const OUTREACH_REPLY_TO: &str = "support@weddingcounselors.com";

const BUTTON: &str = "display:inline-block;padding:12px 24px;background:#0d9488;color:#fff;\
text-decoration:none;border-radius:6px;font-weight:600;";

/// Onboarding sequence steps, in send order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DripStep {
    CompleteProfile,
    FirstWeek,
    MoreInquiries,
}

impl DripStep {
    pub fn all() -> [DripStep; 3] {
        [Self::CompleteProfile, Self::FirstWeek, Self::MoreInquiries]
    }

    /// Ledger key component.
    pub fn number(self) -> u8 {
        match self {
            Self::CompleteProfile => 1,
            Self::FirstWeek => 2,
            Self::MoreInquiries => 3,
        }
    }

    pub fn default_days_after(self) -> i64 {
        match self {
            Self::CompleteProfile => 2,
            Self::FirstWeek => 7,
            Self::MoreInquiries => 14,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct DripStats {
    pub total_views: i64,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct DigestStats {
    pub views_7d: i64,
    pub views_30d: i64,
    pub inquiries_7d: i64,
    pub inquiries_30d: i64,
    pub days_listed: i64,
}

pub enum Template<'a> {
    Drip {
        step: DripStep,
        listing: &'a ListingRow,
        stats: DripStats,
    },
    WeeklyDigest {
        listing: &'a ListingRow,
        stats: DigestStats,
    },
    Outreach {
        template: OutreachTemplate,
        listing: &'a ListingRow,
        claim_token: &'a str,
    },
}

#[derive(Debug, Clone)]
pub struct RenderedEmail {
    pub from: String,
    pub reply_to: Option<String>,
    pub subject: String,
    pub html: String,
}

/// Absolute links into the public site.
#[derive(Debug, Clone)]
pub struct SiteLinks {
    base_url: String,
}

impl SiteLinks {
    pub fn new(base_url: &str) -> Self {
        Self { base_url: base_url.trim_end_matches('/').to_string() }
    }

    pub fn home(&self) -> &str {
        &self.base_url
    }

    pub fn dashboard(&self) -> String {
        format!("{}/professional/dashboard", self.base_url)
    }

    pub fn edit_profile(&self) -> String {
        format!("{}/professional/profile/edit", self.base_url)
    }

    pub fn claim(&self, token: &str) -> String {
        format!("{}/claim/{}", self.base_url, token)
    }

    pub fn unsubscribe(&self, listing_id: &str, kind: PreferenceKind) -> String {
        format!(
            "{}/unsubscribe?profile_id={}&type={}",
            self.base_url,
            listing_id,
            kind.as_str()
        )
    }
}

impl Template<'_> {
    pub fn render(&self, links: &SiteLinks) -> RenderedEmail {
        match self {
            Template::Drip { step, listing, stats } => {
                let name = first_name(&listing.full_name);
                let subject = match step {
                    DripStep::CompleteProfile => format!("{}, a quick tip to get more couples", name),
                    DripStep::FirstWeek => "Your first week on Wedding Counselors".to_string(),
                    DripStep::MoreInquiries => "How to get more inquiries from couples".to_string(),
                };
                let body = match step {
                    DripStep::CompleteProfile => complete_profile_body(listing, links),
                    DripStep::FirstWeek => first_week_body(listing, *stats, links),
                    DripStep::MoreInquiries => more_inquiries_body(listing, links),
                };
                RenderedEmail {
                    from: DRIP_FROM.into(),
                    reply_to: None,
                    subject,
                    html: with_footer(
                        &body,
                        &links.unsubscribe(&listing.id, PreferenceKind::Marketing),
                        "Unsubscribe",
                        links,
                    ),
                }
            }
            Template::WeeklyDigest { listing, stats } => {
                let subject = if stats.views_7d > 0 {
                    format!(
                        "Your profile was viewed {} {} this week",
                        stats.views_7d,
                        plural(stats.views_7d, "time", "times")
                    )
                } else {
                    "Your weekly profile update".to_string()
                };
                RenderedEmail {
                    from: DIGEST_FROM.into(),
                    reply_to: None,
                    subject,
                    html: with_footer(
                        &digest_body(listing, *stats, links),
                        &links.unsubscribe(&listing.id, PreferenceKind::WeeklyDigest),
                        "Unsubscribe from weekly updates",
                        links,
                    ),
                }
            }
            Template::Outreach { template, listing, claim_token } => {
                let subject = match template {
                    OutreachTemplate::InitialOutreach => "Your profile on Wedding Counselors - claim or remove",
                    OutreachTemplate::ClaimReminder => "Reminder: Claim your Wedding Counselors profile",
                };
                RenderedEmail {
                    from: OUTREACH_FROM.into(),
                    reply_to: Some(OUTREACH_REPLY_TO.into()),
                    subject: subject.into(),
                    html: outreach_body(*template, listing, &links.claim(claim_token)),
                }
            }
        }
    }
}

/// "Dr. Jamie Lee, LMFT" -> "Dr."; empty names fall back to "there".
fn first_name(full_name: &str) -> String {
    let name = full_name
        .split(',')
        .next()
        .and_then(|n| n.split_whitespace().next())
        .unwrap_or("");
    if name.is_empty() { "there".into() } else { escape_html(name) }
}

fn plural<'a>(n: i64, one: &'a str, many: &'a str) -> &'a str {
    if n == 1 { one } else { many }
}

fn city(listing: &ListingRow) -> String {
    escape_html(listing.city.as_deref().unwrap_or("your area"))
}

pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn with_footer(body: &str, unsubscribe: &str, label: &str, links: &SiteLinks) -> String {
    format!(
        r#"<div style="font-family:-apple-system,'Segoe UI',Roboto,sans-serif;line-height:1.6;color:#333;max-width:560px;margin:0 auto;">
{body}
<div style="padding:16px;font-size:12px;color:#9ca3af;text-align:center;">
<a href="{home}" style="color:#6b7280;">WeddingCounselors.com</a> &middot;
<a href="{unsubscribe}" style="color:#6b7280;text-decoration:underline;">{label}</a>
</div>
</div>"#,
        home = links.home(),
    )
}

fn cta(href: &str, label: &str) -> String {
    format!(r#"<p style="text-align:center;margin:24px 0;"><a href="{href}" style="{BUTTON}">{label}</a></p>"#)
}

fn complete_profile_body(listing: &ListingRow, links: &SiteLinks) -> String {
    let mut missing = Vec::new();
    if listing.photo_url.as_deref().is_none_or(str::is_empty) {
        missing.push("A professional photo");
    }
    if listing.bio.as_deref().map(str::len).unwrap_or(0) < 150 {
        missing.push("A detailed bio (150+ characters)");
    }
    if listing.profession.as_deref().is_none_or(str::is_empty) {
        missing.push("Your profession and credentials");
    }

    let priorities = if missing.is_empty() {
        r#"<p style="color:#0d9488;font-weight:600;">Your profile already covers the essentials.</p>"#.to_string()
    } else {
        let items: String = missing.iter().map(|m| format!("<li>{m}</li>")).collect();
        format!(
            r#"<div style="background:#f0fdf4;padding:16px;border-radius:8px;border-left:4px solid #0d9488;">
<p style="margin:0 0 8px;font-weight:600;">Where to start:</p><ul style="margin:0;padding-left:20px;">{items}</ul></div>"#
        )
    };

    format!(
        r#"<div style="padding:24px;">
<p>Hi {name},</p>
<p>Complete profiles get noticeably more inquiries from couples.</p>
{priorities}
{button}
<p style="font-size:14px;color:#6b7280;">It takes about five minutes, and couples in {city} are searching now.</p>
</div>"#,
        name = first_name(&listing.full_name),
        button = cta(&links.edit_profile(), "Update Your Profile"),
        city = city(listing),
    )
}

fn first_week_body(listing: &ListingRow, stats: DripStats, links: &SiteLinks) -> String {
    let views = stats.total_views;
    let message = if views > 0 {
        format!("Couples in {} are finding you. Keep your profile current to turn views into inquiries.", city(listing))
    } else {
        "Views grow as more couples discover the directory. A complete profile with a photo ranks higher.".to_string()
    };
    format!(
        r#"<div style="padding:24px;">
<p>Hi {name},</p>
<p>You have been listed on Wedding Counselors for a week. Here is where things stand:</p>
<div style="background:#f9fafb;padding:16px;border-radius:8px;text-align:center;">
<div style="font-size:32px;font-weight:700;color:#7c3aed;">{views}</div>
<div style="font-size:14px;color:#6b7280;">profile {noun} so far</div>
</div>
<p>{message}</p>
{button}
</div>"#,
        name = first_name(&listing.full_name),
        noun = plural(views, "view", "views"),
        button = cta(&links.dashboard(), "View Your Dashboard"),
    )
}

fn more_inquiries_body(listing: &ListingRow, links: &SiteLinks) -> String {
    let tips = [
        ("Professional photo", "A friendly headshot draws far more clicks than an empty avatar."),
        ("Detailed bio", "Describe your approach so couples know what to expect."),
        ("Fast replies", "Answering within a day makes a booking much more likely."),
        ("Specialties", "Every field you fill in adds searches you can appear in."),
    ];
    let items: String = tips
        .iter()
        .enumerate()
        .map(|(i, (title, text))| {
            format!(
                r#"<div style="padding:12px 0;border-bottom:1px solid #f3f4f6;"><strong style="color:#0d9488;">{}. {title}</strong>
<p style="font-size:14px;color:#6b7280;margin:4px 0 0;">{text}</p></div>"#,
                i + 1
            )
        })
        .collect();
    format!(
        r#"<div style="padding:24px;">
<p>Hi {name},</p>
<p>Two weeks in. These make the biggest difference for counselors on the directory:</p>
{items}
{button}
<p style="font-size:14px;color:#6b7280;">Questions? Reply to this email.</p>
</div>"#,
        name = first_name(&listing.full_name),
        button = cta(&links.edit_profile(), "Optimize Your Profile"),
    )
}

fn digest_body(listing: &ListingRow, stats: DigestStats, links: &SiteLinks) -> String {
    let place = city(listing);
    let message = if stats.inquiries_7d > 0 {
        format!("Couples in {place} are reaching out. Replies within 24 hours convert best.")
    } else if stats.views_7d > 0 {
        format!("Couples in {place} are viewing your profile. A photo and detailed bio turn views into inquiries.")
    } else {
        format!("Your profile is live in premarital counseling searches for {place}.")
    };
    let location = match (&listing.city, &listing.state_province) {
        (Some(c), Some(s)) => format!("{}, {}", escape_html(c), escape_html(s)),
        (Some(c), None) => escape_html(c),
        _ => String::new(),
    };

    format!(
        r#"<div style="background:#0d9488;padding:24px;border-radius:12px 12px 0 0;text-align:center;">
<h1 style="color:#fff;margin:0;font-size:20px;">Your Weekly Profile Update</h1>
<p style="color:rgba(255,255,255,0.85);margin:4px 0 0;font-size:14px;">{name} &middot; {location}</p>
</div>
<div style="padding:24px;border:1px solid #e5e7eb;border-top:none;">
<table width="100%" style="text-align:center;"><tr>
<td><div style="font-size:28px;font-weight:700;">{v7}</div><div style="font-size:12px;color:#6b7280;">VIEWS THIS WEEK</div></td>
<td><div style="font-size:28px;font-weight:700;">{i7}</div><div style="font-size:12px;color:#6b7280;">INQUIRIES THIS WEEK</div></td>
<td><div style="font-size:28px;font-weight:700;">{days}</div><div style="font-size:12px;color:#6b7280;">DAYS LISTED</div></td>
</tr></table>
<p style="background:#f9fafb;padding:12px 16px;border-radius:8px;font-size:14px;"><strong>Last 30 days:</strong> {v30} {vnoun}, {i30} {inoun}</p>
<p>{message}</p>
{button}
<p style="text-align:center;"><a href="{edit}" style="color:#0d9488;">Update your profile</a></p>
</div>"#,
        name = escape_html(&listing.full_name),
        v7 = stats.views_7d,
        i7 = stats.inquiries_7d,
        days = stats.days_listed,
        v30 = stats.views_30d,
        vnoun = plural(stats.views_30d, "view", "views"),
        i30 = stats.inquiries_30d,
        inoun = plural(stats.inquiries_30d, "inquiry", "inquiries"),
        button = cta(&links.dashboard(), "View Dashboard"),
        edit = links.edit_profile(),
    )
}

fn outreach_body(template: OutreachTemplate, listing: &ListingRow, claim_url: &str) -> String {
    let name = first_name(&listing.full_name);
    let button = cta(claim_url, "Claim Your Profile");
    match template {
        OutreachTemplate::InitialOutreach => format!(
            r#"<div style="font-family:-apple-system,'Segoe UI',Roboto,sans-serif;max-width:600px;margin:0 auto;padding:20px;color:#333;">
<h2 style="color:#0d9488;">Hi {name},</h2>
<p>We created a profile for your practice on <strong>WeddingCounselors.com</strong>, a directory that helps engaged couples find premarital counselors. It was built from publicly available information.</p>
<p><strong>Claim it</strong> to edit your details and receive inquiries directly:</p>
{button}
<p><strong>Prefer not to be listed?</strong> Reply with "remove me" and we will take the profile down.</p>
<p>The claim link expires in 7 days. You can request removal at any time.</p>
<p style="color:#666;font-size:14px;">Best regards,<br>The Wedding Counselors Team</p>
</div>"#
        ),
        OutreachTemplate::ClaimReminder => format!(
            r#"<div style="font-family:-apple-system,'Segoe UI',Roboto,sans-serif;max-width:600px;margin:0 auto;padding:20px;color:#333;">
<h2 style="color:#0d9488;">Reminder: your profile on Wedding Counselors</h2>
<p>Hi {name},</p>
<p>We wrote last week about your listing on WeddingCounselors.com. You can still claim it and manage your information, or reply "remove me" to have it deleted.</p>
{button}
<p style="color:#9ca3af;font-size:12px;">Replying "remove me" also removes you from all future messages.</p>
</div>"#
        ),
    }
}
